use std::sync::Arc;

use tokio::sync::watch;

use crate::application::repos::RepoError;
use crate::cache::{KeyPrefix, ListState, ListSubscription, QueryKey};
use crate::domain::entities::{ListResult, TagUsage};

use super::service::ContentService;

impl ContentService {
    /// Subscribe to one list. An absent or stale list is fetched in the background.
    pub fn watch_list(&self, key: QueryKey) -> ListSubscription {
        let (subscription, needs_fetch) = self.store.subscribe(&key);
        if needs_fetch {
            self.refetcher.refetch_list(key);
        }
        subscription
    }

    /// Subscribe and wait for the first result.
    pub async fn load_list(&self, key: QueryKey) -> Result<Arc<ListResult>, RepoError> {
        let mut subscription = self.watch_list(key);
        match subscription.loaded().await {
            Some(ListState::Ready(list)) => Ok(list),
            Some(ListState::Failed(error)) => Err(RepoError::clone(&error)),
            Some(ListState::Loading) | None => Err(RepoError::transport(
                "list subscription closed before the first result",
            )),
        }
    }

    /// Subscribe to tag usage, fetching it first if it was never loaded.
    pub fn watch_tag_usage(&self) -> watch::Receiver<Option<Arc<Vec<TagUsage>>>> {
        let receiver = self.store.watch_tag_usage();
        if receiver.borrow().is_none() {
            self.refetcher.refresh_tag_usage();
        }
        receiver
    }

    /// Refetch tag usage and return it once the refresh has finished.
    pub async fn load_tag_usage(&self) -> Option<Arc<Vec<TagUsage>>> {
        self.refetcher.refresh_tag_usage();
        self.refetcher.wait_idle().await;
        self.store.tag_usage()
    }

    /// Mark everything under `prefix` stale; observed lists are refetched.
    pub fn invalidate(&self, prefix: KeyPrefix) {
        self.trigger.invalidate(prefix);
    }

    /// Wait for every background fetch started so far.
    pub async fn wait_idle(&self) {
        self.refetcher.wait_idle().await;
    }
}
