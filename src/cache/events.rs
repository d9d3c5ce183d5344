//! Cache event system.
//!
//! Defines cache events and a bounded in-memory queue for event-driven invalidation.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::content::MutationKind;
use crate::domain::types::ContentType;

use super::keys::KeyPrefix;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "shelfmark_cache_event_queue_len";
const METRIC_DROPPED: &str = "shelfmark_cache_event_dropped_total";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// Cache event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The server accepted a mutation.
    MutationSettled {
        content_type: ContentType,
        kind: MutationKind,
        tags_changed: bool,
    },
    /// A caller asked for everything under a prefix to be refetched.
    ManualRefresh { prefix: KeyPrefix },
}

/// Bounded in-memory event queue.
///
/// Write paths publish, the consumer drains. When full, the oldest pending
/// manual refresh is dropped. Settled mutations are never dropped; with only
/// those queued the queue grows past its limit.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
    limit: usize,
}

impl EventQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit: limit.max(1),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event to the queue and return it.
    pub fn publish(&self, kind: EventKind) -> CacheEvent {
        let event = CacheEvent::new(kind, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.limit {
            let droppable = queue
                .iter()
                .position(|pending| matches!(pending.kind, EventKind::ManualRefresh { .. }));
            match droppable.and_then(|index| queue.remove(index)) {
                Some(dropped) => {
                    warn!(
                        event_id = %dropped.id,
                        event_epoch = dropped.epoch,
                        limit = self.limit,
                        "Cache event queue full; dropped oldest manual refresh"
                    );
                    counter!(METRIC_DROPPED).increment(1);
                }
                None => warn!(
                    limit = self.limit,
                    len = queue.len(),
                    "Cache event queue full of settled mutations; growing past limit"
                ),
            }
        }
        queue.push_back(event.clone());
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        event
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let events = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        events
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
