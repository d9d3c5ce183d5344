use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::repos::{ContentListRepo, ContentWriteRepo, TagsRepo};
use crate::cache::{CacheConfig, CacheConsumer, CacheTrigger, EventQueue, ListStore, Refetcher};
use crate::domain::types::ContentType;

use super::intent::MutationKind;
use super::lifecycle::MutationTicket;

/// UI-facing entry point: list subscriptions and the single mutation path.
#[derive(Clone)]
pub struct ContentService {
    pub(crate) store: Arc<ListStore>,
    pub(crate) writer: Arc<dyn ContentWriteRepo>,
    pub(crate) refetcher: Arc<Refetcher>,
    pub(crate) trigger: Arc<CacheTrigger>,
    epochs: Arc<AtomicU64>,
}

impl ContentService {
    pub fn new(
        config: CacheConfig,
        writer: Arc<dyn ContentWriteRepo>,
        lists: Arc<dyn ContentListRepo>,
        tags: Arc<dyn TagsRepo>,
    ) -> Self {
        let store = Arc::new(ListStore::new(&config));
        let refetcher = Arc::new(Refetcher::new(Arc::clone(&store), lists, tags));
        let queue = Arc::new(EventQueue::new(config.event_queue_limit_non_zero().get()));
        let consumer = Arc::new(CacheConsumer::new(
            config,
            Arc::clone(&queue),
            Arc::clone(&refetcher),
        ));
        let trigger = Arc::new(CacheTrigger::new(queue, consumer));

        Self {
            store,
            writer,
            refetcher,
            trigger,
            epochs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<ListStore> {
        &self.store
    }

    pub fn trigger(&self) -> &Arc<CacheTrigger> {
        &self.trigger
    }

    pub(crate) fn next_ticket(&self, content_type: ContentType, kind: MutationKind) -> MutationTicket {
        MutationTicket::new(self.epochs.fetch_add(1, Ordering::SeqCst), kind, content_type)
    }
}
