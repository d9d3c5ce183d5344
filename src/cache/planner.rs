//! Invalidation plan generation.
//!
//! Merges a batch of cache events into one plan.

use std::collections::HashSet;
use std::fmt;

use super::events::{CacheEvent, EventKind};
use super::keys::KeyPrefix;
use super::policy;

/// Actions that bring the cache back in line with the server.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Prefixes to mark stale, in first-seen order, without duplicates.
    pub stale_prefixes: Vec<KeyPrefix>,
    /// Whether tag usage must be refetched.
    pub refresh_tag_usage: bool,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvalidationPlan { stale: [")?;
        for (index, prefix) in self.stale_prefixes.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{prefix}")?;
        }
        write!(f, "], refresh_tag_usage: {} }}", self.refresh_tag_usage)
    }
}

impl InvalidationPlan {
    /// Merge events into a plan, ignoring duplicate event ids.
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        let mut seen_prefixes = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            match event.kind {
                EventKind::MutationSettled {
                    content_type,
                    kind,
                    tags_changed,
                } => {
                    for prefix in policy::stale_prefixes(content_type, kind) {
                        if seen_prefixes.insert(prefix.clone()) {
                            plan.stale_prefixes.push(prefix);
                        }
                    }
                    plan.refresh_tag_usage |= policy::refreshes_tag_usage(kind, tags_changed);
                }
                EventKind::ManualRefresh { prefix } => {
                    if seen_prefixes.insert(prefix.clone()) {
                        plan.stale_prefixes.push(prefix);
                    }
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.stale_prefixes.is_empty() && !self.refresh_tag_usage
    }
}
