//! Cache consumer for executing invalidation plans.
//!
//! Consumes events from the queue, marks the affected lists stale and
//! schedules the refetches that bring observed lists back in line.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner::InvalidationPlan;
use super::refetch::Refetcher;

const METRIC_CACHE_CONSUME_MS: &str = "shelfmark_cache_consume_ms";

/// Cache consumer that processes events and maintains cache consistency.
///
/// The consumer:
/// 1. Drains events from the queue
/// 2. Merges them into an invalidation plan
/// 3. Marks prefixes stale, refetches observed lists, refreshes tag usage
pub struct CacheConsumer {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    refetcher: Arc<Refetcher>,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, refetcher: Arc<Refetcher>) -> Self {
        Self {
            config,
            queue,
            refetcher,
        }
    }

    /// Consume pending events and execute the plan.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let consume_started_at = Instant::now();
        let events = self
            .queue
            .drain(self.config.consume_batch_limit_non_zero().get());
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let refetched = self.execute(&plan);

        info!(
            event_count,
            invalidated = plan.stale_prefixes.len(),
            refetched,
            "Cache consumption complete"
        );

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    /// Consume batches until the queue is empty.
    ///
    /// Returns the number of batches processed.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }

    fn execute(&self, plan: &InvalidationPlan) -> usize {
        let store = self.refetcher.store();
        let mut refetched = 0;

        for prefix in &plan.stale_prefixes {
            let marks = store.mark_stale(prefix);
            // Superseded fetches are restarted even when refetching is deferred.
            let keys = if self.config.refetch_on_invalidate {
                marks.observed
            } else {
                marks.superseded
            };
            for key in keys {
                self.refetcher.refetch_list(key);
                refetched += 1;
            }
        }

        if plan.refresh_tag_usage {
            self.refetcher.refresh_tag_usage();
        }

        refetched
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
