//! List cache storage.
//!
//! Holds one `CacheEntry` per `QueryKey` plus the tag-usage aggregate. Every
//! public operation takes the store lock once and runs to completion, so two
//! mutations can only interleave between operations, never inside one.

use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::application::repos::RepoError;
use crate::domain::entities::{ListResult, TagUsage};

use super::config::CacheConfig;
use super::keys::{KeyPrefix, QueryKey};
use super::lock::{mutex_lock, rw_read, rw_write};
use super::transform::ListTransform;

const SOURCE: &str = "cache::store";
const METRIC_FETCH: &str = "shelfmark_cache_fetch_total";
const METRIC_FETCH_CANCELLED: &str = "shelfmark_cache_fetch_cancelled_total";
const METRIC_EVICT: &str = "shelfmark_cache_evict_total";

// ============================================================================
// Entries
// ============================================================================

/// What a subscriber of one list currently sees.
#[derive(Debug, Clone)]
pub enum ListState {
    /// Never fetched, or the first fetch is still running.
    Loading,
    Ready(Arc<ListResult>),
    /// The last fetch failed and there is no earlier result to show.
    Failed(Arc<RepoError>),
}

impl ListState {
    pub fn result(&self) -> Option<&Arc<ListResult>> {
        match self {
            ListState::Ready(result) => Some(result),
            ListState::Loading | ListState::Failed(_) => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ListState::Loading)
    }
}

struct InFlight {
    generation: u64,
    abort: Option<AbortHandle>,
}

struct CacheEntry {
    data: Option<Arc<ListResult>>,
    stale: bool,
    error: Option<Arc<RepoError>>,
    generation: u64,
    in_flight: Option<InFlight>,
    state_tx: watch::Sender<ListState>,
}

impl CacheEntry {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(ListState::Loading);
        Self {
            data: None,
            stale: false,
            error: None,
            generation: 0,
            in_flight: None,
            state_tx,
        }
    }

    fn observers(&self) -> usize {
        self.state_tx.receiver_count()
    }

    fn view(&self) -> ListState {
        match (&self.data, &self.error) {
            (Some(data), _) => ListState::Ready(Arc::clone(data)),
            (None, Some(error)) => ListState::Failed(Arc::clone(error)),
            (None, None) => ListState::Loading,
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.view());
    }

    fn needs_fetch(&self) -> bool {
        self.in_flight.is_none() && (self.data.is_none() || self.stale)
    }

    /// Abort the running fetch, if any, and make its response unusable.
    fn cancel_fetch(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        if let Some(abort) = in_flight.abort {
            abort.abort();
        }
        self.generation += 1;
        true
    }
}

/// Read-only view of one list, updated whenever the cached result changes.
pub struct ListSubscription {
    key: QueryKey,
    state_rx: watch::Receiver<ListState>,
}

impl ListSubscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> ListState {
        self.state_rx.borrow().clone()
    }

    /// Wait for the next change. Returns false once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.state_rx.changed().await.is_ok()
    }

    /// Wait until the list has left the loading state.
    pub async fn loaded(&mut self) -> Option<ListState> {
        self.state_rx
            .wait_for(|state| !state.is_loading())
            .await
            .ok()
            .map(|state| state.clone())
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Prior value of one entry, captured before an optimistic rewrite.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub key: QueryKey,
    pub data: Option<Arc<ListResult>>,
    pub stale: bool,
}

/// Captured cache state used to undo an optimistic rewrite.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of putting a snapshot back.
#[derive(Debug, Default)]
pub struct Restored {
    /// Entries whose data changed.
    pub changed: usize,
    /// Observed entries left absent or stale with no fetch running.
    pub refetch: Vec<QueryKey>,
}

/// Result of flagging a prefix stale.
#[derive(Debug, Default)]
pub struct StaleMarks {
    /// Matching keys with subscribers.
    pub observed: Vec<QueryKey>,
    /// Observed keys whose running fetch was superseded by the stale mark.
    pub superseded: Vec<QueryKey>,
}

// ============================================================================
// Tag usage
// ============================================================================

struct TagUsageSlot {
    generation: u64,
    usage_tx: watch::Sender<Option<Arc<Vec<TagUsage>>>>,
}

// ============================================================================
// Store
// ============================================================================

/// Shared store of list results and the tag-usage aggregate.
pub struct ListStore {
    max_idle_entries: usize,
    // Unbounded: recency order drives idle collection, observed entries are never evicted.
    entries: Mutex<LruCache<QueryKey, CacheEntry>>,
    tag_usage: RwLock<TagUsageSlot>,
}

impl ListStore {
    pub fn new(config: &CacheConfig) -> Self {
        let (usage_tx, _) = watch::channel(None);
        Self {
            max_idle_entries: config.max_idle_entries,
            entries: Mutex::new(LruCache::unbounded()),
            tag_usage: RwLock::new(TagUsageSlot {
                generation: 0,
                usage_tx,
            }),
        }
    }

    // ========================================================================
    // Single-key access
    // ========================================================================

    /// Subscribe to `key`, creating an absent entry if needed.
    ///
    /// The flag tells the caller whether a fetch should be started: the entry
    /// is absent or stale and nothing is fetching it yet.
    pub fn subscribe(&self, key: &QueryKey) -> (ListSubscription, bool) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "subscribe");
        let entry = entries.get_or_insert_mut(key.clone(), CacheEntry::new);
        entry.publish();
        let state_rx = entry.state_tx.subscribe();
        let needs_fetch = entry.needs_fetch();
        self.collect_idle(&mut entries);

        (
            ListSubscription {
                key: key.clone(),
                state_rx,
            },
            needs_fetch,
        )
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<ListResult>> {
        mutex_lock(&self.entries, SOURCE, "get")
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    /// Store a fetched result for `key`, marking it fresh.
    pub fn set(&self, key: QueryKey, result: ListResult) -> Arc<ListResult> {
        let data = Arc::new(result);
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        let entry = entries.get_or_insert_mut(key, CacheEntry::new);
        entry.data = Some(Arc::clone(&data));
        entry.stale = false;
        entry.error = None;
        entry.publish();
        self.collect_idle(&mut entries);
        data
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(key)
    }

    /// Whether `key` is cached and flagged stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "is_stale")
            .peek(key)
            .is_some_and(|entry| entry.stale)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "is_fetching")
            .peek(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.entries, SOURCE, "observer_count")
            .peek(key)
            .map_or(0, CacheEntry::observers)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Prefix operations
    // ========================================================================

    /// Every present result under `prefix`. Absent entries are skipped.
    pub fn read_all(&self, prefix: &KeyPrefix) -> Vec<(QueryKey, Arc<ListResult>)> {
        mutex_lock(&self.entries, SOURCE, "read_all")
            .iter()
            .filter(|(key, _)| prefix.matches(key))
            .filter_map(|(key, entry)| entry.data.clone().map(|data| (key.clone(), data)))
            .collect()
    }

    /// Rewrite every present result under `prefix`; returns how many changed.
    ///
    /// Absent entries are left alone. An updater that hands back its input
    /// (same `Arc`) counts as no change and does not notify subscribers.
    pub fn write_all<F>(&self, prefix: &KeyPrefix, updater: F) -> usize
    where
        F: FnMut(&Arc<ListResult>) -> Arc<ListResult>,
    {
        let mut entries = mutex_lock(&self.entries, SOURCE, "write_all");
        write_matching(&mut entries, std::slice::from_ref(prefix), updater)
    }

    /// Flag every entry under `prefix` stale.
    ///
    /// A fetch already running for a matching key was issued before the mark,
    /// so it is superseded: its response is dropped and must not clear the flag.
    pub fn mark_stale(&self, prefix: &KeyPrefix) -> StaleMarks {
        let mut entries = mutex_lock(&self.entries, SOURCE, "mark_stale");
        let mut marks = StaleMarks::default();
        let mut cancelled = 0u64;
        for (key, entry) in entries.iter_mut() {
            if !prefix.matches(key) {
                continue;
            }
            entry.stale = true;
            let superseded = entry.cancel_fetch();
            if superseded {
                cancelled += 1;
            }
            if entry.observers() > 0 {
                marks.observed.push(key.clone());
                if superseded {
                    marks.superseded.push(key.clone());
                }
            }
        }
        if cancelled > 0 {
            counter!(METRIC_FETCH_CANCELLED).increment(cancelled);
        }
        debug!(
            %prefix,
            observed = marks.observed.len(),
            superseded = cancelled,
            "Marked lists stale"
        );
        marks
    }

    /// Abort in-flight fetches under `prefix` so their responses are dropped.
    pub fn cancel_fetches(&self, prefix: &KeyPrefix) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "cancel_fetches");
        cancel_matching(&mut entries, std::slice::from_ref(prefix))
    }

    /// Capture every entry under any of `prefixes`, absent ones included.
    pub fn snapshot(&self, prefixes: &[KeyPrefix]) -> Snapshot {
        let entries = mutex_lock(&self.entries, SOURCE, "snapshot");
        snapshot_matching(&entries, prefixes)
    }

    /// Cancel competing fetches, snapshot, then apply `transform`, all under one lock.
    ///
    /// Nothing can observe or fetch into the store between the three steps.
    pub fn begin_optimistic(
        &self,
        prefixes: &[KeyPrefix],
        transform: Option<&ListTransform>,
    ) -> Snapshot {
        let mut entries = mutex_lock(&self.entries, SOURCE, "begin_optimistic");
        let cancelled = cancel_matching(&mut entries, prefixes);
        let snapshot = snapshot_matching(&entries, prefixes);
        let rewritten = match transform {
            Some(transform) => write_matching(&mut entries, prefixes, |list| transform.apply(list)),
            None => 0,
        };
        debug!(
            cancelled,
            snapshot_len = snapshot.len(),
            rewritten,
            "Applied optimistic rewrite"
        );
        snapshot
    }

    /// Put every captured entry back exactly as it was, absent included.
    ///
    /// The optimistic phase cancelled fetches under the same prefixes, so any
    /// observed entry that ends up absent or stale without a fetch is reported
    /// for refetching.
    pub fn restore(&self, snapshot: Snapshot) -> Restored {
        let mut entries = mutex_lock(&self.entries, SOURCE, "restore");
        let mut restored = Restored::default();
        for SnapshotEntry { key, data, stale } in snapshot.entries {
            let entry = match entries.peek_mut(&key) {
                Some(entry) => entry,
                None if data.is_none() => continue,
                None => entries.get_or_insert_mut(key.clone(), CacheEntry::new),
            };
            let unchanged = match (&entry.data, &data) {
                (Some(current), Some(prior)) => Arc::ptr_eq(current, prior),
                (None, None) => true,
                _ => false,
            };
            entry.stale = stale;
            if !unchanged {
                entry.data = data;
                entry.publish();
                restored.changed += 1;
            }
            if entry.observers() > 0 && entry.needs_fetch() {
                restored.refetch.push(key);
            }
        }
        restored
    }

    // ========================================================================
    // Fetch bookkeeping
    // ========================================================================

    /// Register a new fetch for `key` and return its generation.
    ///
    /// A fetch already running for the key is aborted first.
    pub fn begin_fetch(&self, key: &QueryKey) -> u64 {
        let mut entries = mutex_lock(&self.entries, SOURCE, "begin_fetch");
        let entry = entries.get_or_insert_mut(key.clone(), CacheEntry::new);
        if entry.cancel_fetch() {
            counter!(METRIC_FETCH_CANCELLED).increment(1);
        }
        entry.generation += 1;
        entry.in_flight = Some(InFlight {
            generation: entry.generation,
            abort: None,
        });
        // A retry after a failed first fetch shows as loading again.
        if entry.data.is_none() && entry.error.take().is_some() {
            entry.publish();
        }
        debug!(key = %key, generation = entry.generation, "List fetch started");
        entry.generation
    }

    /// Attach the abort handle of the task running fetch `generation`.
    pub fn attach_fetch(&self, key: &QueryKey, generation: u64, abort: AbortHandle) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "attach_fetch");
        if let Some(in_flight) = entries
            .peek_mut(key)
            .and_then(|entry| entry.in_flight.as_mut())
            .filter(|in_flight| in_flight.generation == generation)
        {
            in_flight.abort = Some(abort);
        }
    }

    /// Apply the response of fetch `generation`; superseded responses are dropped.
    pub fn complete_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<ListResult, RepoError>,
    ) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "complete_fetch");
        let Some(entry) = entries.peek_mut(key) else {
            counter!(METRIC_FETCH, "outcome" => "discarded").increment(1);
            return false;
        };
        let current = entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation);
        if !current {
            debug!(key = %key, generation, "Discarded superseded list fetch");
            counter!(METRIC_FETCH, "outcome" => "discarded").increment(1);
            return false;
        }

        entry.in_flight = None;
        match result {
            Ok(list) => {
                entry.data = Some(Arc::new(list));
                entry.stale = false;
                entry.error = None;
                counter!(METRIC_FETCH, "outcome" => "ok").increment(1);
            }
            Err(error) => {
                entry.error = Some(Arc::new(error));
                counter!(METRIC_FETCH, "outcome" => "error").increment(1);
            }
        }
        entry.publish();
        true
    }

    // ========================================================================
    // Tag usage aggregate
    // ========================================================================

    pub fn tag_usage(&self) -> Option<Arc<Vec<TagUsage>>> {
        rw_read(&self.tag_usage, SOURCE, "tag_usage")
            .usage_tx
            .borrow()
            .clone()
    }

    pub fn watch_tag_usage(&self) -> watch::Receiver<Option<Arc<Vec<TagUsage>>>> {
        rw_read(&self.tag_usage, SOURCE, "watch_tag_usage")
            .usage_tx
            .subscribe()
    }

    /// Replace the aggregate wholesale.
    pub fn set_tag_usage(&self, usage: Vec<TagUsage>) {
        rw_write(&self.tag_usage, SOURCE, "set_tag_usage")
            .usage_tx
            .send_replace(Some(Arc::new(usage)));
    }

    /// Start a refresh; only the most recently started one may land.
    pub fn begin_tag_refresh(&self) -> u64 {
        let mut slot = rw_write(&self.tag_usage, SOURCE, "begin_tag_refresh");
        slot.generation += 1;
        slot.generation
    }

    pub fn complete_tag_refresh(&self, generation: u64, usage: Vec<TagUsage>) -> bool {
        let slot = rw_write(&self.tag_usage, SOURCE, "complete_tag_refresh");
        if slot.generation != generation {
            debug!(generation, "Discarded superseded tag usage refresh");
            return false;
        }
        slot.usage_tx.send_replace(Some(Arc::new(usage)));
        true
    }

    // ========================================================================
    // Idle collection
    // ========================================================================

    fn collect_idle(&self, entries: &mut LruCache<QueryKey, CacheEntry>) {
        let idle: Vec<QueryKey> = entries
            .iter()
            .rev()
            .filter(|(_, entry)| entry.observers() == 0 && entry.in_flight.is_none())
            .map(|(key, _)| key.clone())
            .collect();
        if idle.len() <= self.max_idle_entries {
            return;
        }

        let excess = idle.len() - self.max_idle_entries;
        for key in idle.into_iter().take(excess) {
            entries.pop(&key);
            counter!(METRIC_EVICT).increment(1);
        }
    }
}

fn cancel_matching(entries: &mut LruCache<QueryKey, CacheEntry>, prefixes: &[KeyPrefix]) -> usize {
    let mut cancelled = 0;
    for (key, entry) in entries.iter_mut() {
        if prefixes.iter().any(|prefix| prefix.matches(key)) && entry.cancel_fetch() {
            cancelled += 1;
        }
    }
    if cancelled > 0 {
        counter!(METRIC_FETCH_CANCELLED).increment(cancelled as u64);
    }
    cancelled
}

fn snapshot_matching(entries: &LruCache<QueryKey, CacheEntry>, prefixes: &[KeyPrefix]) -> Snapshot {
    let entries = entries
        .iter()
        .filter(|(key, _)| prefixes.iter().any(|prefix| prefix.matches(key)))
        .map(|(key, entry)| SnapshotEntry {
            key: key.clone(),
            data: entry.data.clone(),
            stale: entry.stale,
        })
        .collect();
    Snapshot { entries }
}

fn write_matching<F>(
    entries: &mut LruCache<QueryKey, CacheEntry>,
    prefixes: &[KeyPrefix],
    mut updater: F,
) -> usize
where
    F: FnMut(&Arc<ListResult>) -> Arc<ListResult>,
{
    let mut changed = 0;
    for (key, entry) in entries.iter_mut() {
        if !prefixes.iter().any(|prefix| prefix.matches(key)) {
            continue;
        }
        let Some(current) = entry.data.as_ref() else {
            continue;
        };
        let next = updater(current);
        if Arc::ptr_eq(current, &next) {
            continue;
        }
        entry.data = Some(next);
        entry.publish();
        changed += 1;
    }
    changed
}
