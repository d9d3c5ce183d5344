//! Cache trigger service.
//!
//! Publishes cache events and, on the write path, consumes them immediately.

use std::sync::Arc;

use super::consumer::CacheConsumer;
use super::events::{CacheEvent, EventKind, EventQueue};
use super::keys::KeyPrefix;
use crate::application::content::MutationKind;
use crate::domain::types::ContentType;

/// Cache trigger for publishing cache events.
///
/// ```ignore
/// // After the server accepted an archive:
/// trigger.mutation_settled(ContentType::Bookmark, MutationKind::Archive, false);
/// ```
pub struct CacheTrigger {
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self { queue, consumer }
    }

    /// Publish an event and optionally consume immediately.
    ///
    /// Without `consume_now` the event waits for the next explicit consumption.
    /// With it, the queue is drained completely, backlog included.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) -> CacheEvent {
        let event = self.queue.publish(kind);
        if consume_now {
            self.consumer.consume_all();
        }
        event
    }

    pub fn mutation_settled(
        &self,
        content_type: ContentType,
        kind: MutationKind,
        tags_changed: bool,
    ) -> CacheEvent {
        self.trigger(
            EventKind::MutationSettled {
                content_type,
                kind,
                tags_changed,
            },
            true,
        )
    }

    /// Mark everything under `prefix` stale and refetch what is observed.
    pub fn invalidate(&self, prefix: KeyPrefix) -> CacheEvent {
        self.trigger(EventKind::ManualRefresh { prefix }, true)
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }
}
