//! Background fetches feeding the list store.
//!
//! Every fetch runs as its own tokio task. The store hands out a generation
//! number per fetch, so a response that lost a race with a cancellation or a
//! newer fetch is dropped on arrival instead of overwriting newer state.

use std::panic;
use std::sync::{Arc, Mutex};

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::application::repos::{ContentListRepo, TagsRepo};

use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::store::ListStore;

const SOURCE: &str = "cache::refetch";

pub struct Refetcher {
    store: Arc<ListStore>,
    lists: Arc<dyn ContentListRepo>,
    tags: Arc<dyn TagsRepo>,
    tasks: Mutex<JoinSet<()>>,
}

impl Refetcher {
    pub fn new(
        store: Arc<ListStore>,
        lists: Arc<dyn ContentListRepo>,
        tags: Arc<dyn TagsRepo>,
    ) -> Self {
        Self {
            store,
            lists,
            tags,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<ListStore> {
        &self.store
    }

    /// Fetch `key` in the background, superseding any fetch already running for it.
    pub fn refetch_list(&self, key: QueryKey) {
        let generation = self.store.begin_fetch(&key);
        let store = Arc::clone(&self.store);
        let lists = Arc::clone(&self.lists);
        let task_key = key.clone();

        let abort = {
            let mut tasks = mutex_lock(&self.tasks, SOURCE, "refetch_list");
            reap_finished(&mut tasks);
            tasks.spawn(async move {
                let result = lists.fetch_list(&task_key).await;
                if let Err(error) = &result {
                    warn!(key = %task_key, generation, error = %error, "Background list fetch failed");
                }
                store.complete_fetch(&task_key, generation, result);
            })
        };
        self.store.attach_fetch(&key, generation, abort);
    }

    /// Refetch the tag-usage aggregate wholesale.
    ///
    /// A failed refresh keeps the previous aggregate.
    pub fn refresh_tag_usage(&self) {
        let generation = self.store.begin_tag_refresh();
        let store = Arc::clone(&self.store);
        let tags = Arc::clone(&self.tags);

        let mut tasks = mutex_lock(&self.tasks, SOURCE, "refresh_tag_usage");
        reap_finished(&mut tasks);
        tasks.spawn(async move {
            match tags.fetch_tag_usage().await {
                Ok(usage) => {
                    let applied = store.complete_tag_refresh(generation, usage);
                    debug!(generation, applied, "Tag usage refresh finished");
                }
                Err(error) => {
                    warn!(generation, error = %error, "Tag usage refresh failed; keeping previous counts");
                }
            }
        });
    }

    /// Wait until every background task spawned so far, and any they lead to, has finished.
    ///
    /// A panic inside a background task is resumed here.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = self.take_tasks();
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(error) = joined {
                    resume_if_panicked(error);
                }
            }
        }
    }

    pub fn pending_tasks(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "pending_tasks").len()
    }

    fn take_tasks(&self) -> JoinSet<()> {
        std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "take_tasks"))
    }
}

/// Drop finished tasks so the set does not grow.
///
/// Panics found here belong to earlier fetches, not to the caller, so they
/// are logged and discarded. Only `wait_idle` resumes them.
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(error) = joined
            && error.is_panic()
        {
            warn!(error = %error, "Background cache task panicked");
        }
    }
}

fn resume_if_panicked(error: JoinError) {
    if error.is_panic() {
        panic::resume_unwind(error.into_panic());
    }
}
