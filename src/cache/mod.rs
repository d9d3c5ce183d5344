//! Shelfmark list cache.
//!
//! Keeps every list view the client has fetched, keyed by
//! `(domain, partition, params)`, and keeps those views coherent while
//! mutations are in flight:
//!
//! - **Optimistic rewrites** show the expected result before the server answers
//!   and are rolled back from a snapshot when it refuses.
//! - **Event-driven invalidation** marks the affected partitions stale once the
//!   server accepts, and refetches the lists someone is looking at.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_idle_entries = 200
//! consume_batch_limit = 100
//! event_queue_limit = 1024
//! refetch_on_invalidate = true
//! ```

mod config;
mod consumer;
mod events;
mod keys;
mod lock;
mod planner;
pub mod policy;
mod refetch;
mod store;
mod transform;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use keys::{
    Domain, KeyPrefix, ListParams, Partition, PartitionSelector, QueryKey, hash_value,
};
pub use planner::InvalidationPlan;
pub use refetch::Refetcher;
pub use store::{
    ListState, ListStore, ListSubscription, Restored, Snapshot, SnapshotEntry, StaleMarks,
};
pub use transform::{ListTransform, patch_fields, remove_item};
pub use trigger::CacheTrigger;
