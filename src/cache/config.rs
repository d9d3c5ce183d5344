//! Cache configuration.
//!
//! Controls idle-entry collection, event batching and refetch behaviour via the
//! `[cache]` section of `shelfmark.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_MAX_IDLE_ENTRIES: usize = 200;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_EVENT_QUEUE_LIMIT: usize = 1024;

/// Cache configuration from `shelfmark.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries nobody subscribes to that are kept before the least recently
    /// used ones are collected.
    pub max_idle_entries: usize,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Pending events kept before the oldest is dropped.
    pub event_queue_limit: usize,
    /// Refetch subscribed lists as soon as they are invalidated. When off,
    /// invalidated lists are refetched on their next subscription.
    pub refetch_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_idle_entries: DEFAULT_MAX_IDLE_ENTRIES,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            event_queue_limit: DEFAULT_EVENT_QUEUE_LIMIT,
            refetch_on_invalidate: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_idle_entries: settings.max_idle_entries,
            consume_batch_limit: settings.consume_batch_limit.get(),
            event_queue_limit: settings.event_queue_limit.get(),
            refetch_on_invalidate: settings.refetch_on_invalidate,
        }
    }
}

impl CacheConfig {
    /// Returns the consume batch limit as NonZeroUsize, clamping to 1 if zero.
    pub fn consume_batch_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.consume_batch_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the event queue limit as NonZeroUsize, clamping to 1 if zero.
    pub fn event_queue_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.event_queue_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
