//! Cache key definitions.
//!
//! A `QueryKey` identifies one cached list result as `(domain, partition, params)`.
//! A `KeyPrefix` selects every key sharing a domain, and optionally a partition,
//! regardless of params. Prefixes are the unit of snapshotting, optimistic
//! rewrites and invalidation.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::types::{ContentType, SortField, SortOrder, TagMatch};

/// Top-level namespace of cached lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Domain {
    Bookmark,
    Note,
    Prompt,
    /// Cross-type lists mixing bookmarks, notes and prompts.
    Content,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Bookmark => "bookmark",
            Domain::Note => "note",
            Domain::Prompt => "prompt",
            Domain::Content => "content",
        }
    }
}

impl From<ContentType> for Domain {
    fn from(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Bookmark => Domain::Bookmark,
            ContentType::Note => Domain::Note,
            ContentType::Prompt => Domain::Prompt,
        }
    }
}

/// A slice of a domain's lists sharing visibility rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    Active,
    Archived,
    Deleted,
    /// A saved filter, identified by the server-side filter id.
    Custom(String),
}

impl Partition {
    pub fn custom(filter_id: impl Into<String>) -> Self {
        Self::Custom(filter_id.into())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Active => f.write_str("active"),
            Partition::Archived => f.write_str("archived"),
            Partition::Deleted => f.write_str("deleted"),
            Partition::Custom(id) => write!(f, "custom:{id}"),
        }
    }
}

/// Filter, sort and pagination parameters of a list query.
///
/// Compared by value: two views asking for the same tags in a different order
/// share one cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListParams {
    pub search: Option<String>,
    pub tags: BTreeSet<String>,
    pub tag_match: TagMatch,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub offset: u64,
    pub limit: u64,
    /// Restricts aggregate lists to some content types; empty means all.
    pub content_types: BTreeSet<ContentType>,
}

impl ListParams {
    pub fn page(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = Some(field);
        self.sort_order = Some(order);
        self
    }
}

/// Identity of one cached list result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey {
    pub domain: Domain,
    pub partition: Partition,
    pub params: ListParams,
}

impl QueryKey {
    pub fn new(domain: Domain, partition: Partition, params: ListParams) -> Self {
        Self {
            domain,
            partition,
            params,
        }
    }

    /// Compact digest for log fields.
    pub fn fingerprint(&self) -> u64 {
        hash_value(self)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}#{:016x}",
            self.domain.as_str(),
            self.partition,
            hash_value(&self.params)
        )
    }
}

/// Partition part of a prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionSelector {
    Exact(Partition),
    /// Every `custom:*` partition.
    AnyCustom,
}

impl PartitionSelector {
    pub fn matches(&self, partition: &Partition) -> bool {
        match self {
            PartitionSelector::Exact(expected) => expected == partition,
            PartitionSelector::AnyCustom => matches!(partition, Partition::Custom(_)),
        }
    }
}

/// Selects every key of a domain, optionally narrowed to one partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPrefix {
    pub domain: Domain,
    pub partition: Option<PartitionSelector>,
}

impl KeyPrefix {
    /// Every partition and parameter combination of `domain`.
    pub fn all(domain: Domain) -> Self {
        Self {
            domain,
            partition: None,
        }
    }

    /// One partition of `domain`, across all parameter variations.
    pub fn partition(domain: Domain, partition: Partition) -> Self {
        Self {
            domain,
            partition: Some(PartitionSelector::Exact(partition)),
        }
    }

    /// Every saved-filter partition of `domain`.
    pub fn any_custom(domain: Domain) -> Self {
        Self {
            domain,
            partition: Some(PartitionSelector::AnyCustom),
        }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        self.domain == key.domain
            && self
                .partition
                .as_ref()
                .is_none_or(|selector| selector.matches(&key.partition))
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            None => write!(f, "{}/*", self.domain.as_str()),
            Some(PartitionSelector::Exact(partition)) => {
                write!(f, "{}/{partition}", self.domain.as_str())
            }
            Some(PartitionSelector::AnyCustom) => write!(f, "{}/custom:*", self.domain.as_str()),
        }
    }
}

// ============================================================================
// Hash Utilities
// ============================================================================

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
