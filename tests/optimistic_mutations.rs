//! End-to-end lifecycle tests: optimistic rewrite, rollback, invalidation and
//! dependent refresh, driven through `ContentService` with in-memory repos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use shelfmark::application::content::{ContentService, MutationIntent};
use shelfmark::application::error::MutationError;
use shelfmark::application::repos::{
    ConflictDetails, ContentListRepo, ContentWriteRepo, RepoError, TagsRepo,
};
use shelfmark::cache::{CacheConfig, Domain, KeyPrefix, ListParams, Partition, QueryKey};
use shelfmark::domain::entities::{
    ContentItem, ContentPatch, ItemId, ListResult, NewContent, TagUsage,
};
use shelfmark::domain::types::ContentType;
use time::macros::datetime;
use tokio::sync::Notify;

fn content_item(id: &str) -> ContentItem {
    ContentItem {
        id: ItemId::from(id),
        content_type: ContentType::Bookmark,
        title: Some(format!("title {id}")),
        name: None,
        description: None,
        url: Some(format!("https://example.com/{id}")),
        tags: Vec::new(),
        created_at: datetime!(2025-03-01 9:00 UTC),
        updated_at: datetime!(2025-03-01 9:00 UTC),
        last_used_at: None,
        archived_at: None,
        deleted_at: None,
        version: 1,
    }
}

fn list(ids: &[&str], total: u64) -> ListResult {
    ListResult {
        items: ids.iter().map(|id| Arc::new(content_item(id))).collect(),
        total,
        offset: 0,
        limit: 20,
        has_more: false,
    }
}

fn ids(list: &ListResult) -> Vec<&str> {
    list.items.iter().map(|item| item.id.as_str()).collect()
}

fn key(domain: Domain, partition: Partition) -> QueryKey {
    QueryKey::new(domain, partition, ListParams::page(0, 20))
}

fn search_key(domain: Domain, partition: Partition, search: &str) -> QueryKey {
    QueryKey::new(domain, partition, ListParams::page(0, 20).with_search(search))
}

/// Holds a call until released, when armed.
#[derive(Default)]
struct Gate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    async fn pass(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[derive(Default)]
struct FakeWriter {
    failure: Mutex<Option<RepoError>>,
    archive_failure: Mutex<Option<RepoError>>,
    gate: Gate,
    update_gate: Gate,
    calls: AtomicUsize,
}

impl FakeWriter {
    fn fail_with(&self, error: RepoError) {
        *self.failure.lock().expect("writer lock") = Some(error);
    }

    fn fail_archives_with(&self, error: RepoError) {
        *self.archive_failure.lock().expect("writer lock") = Some(error);
    }

    async fn respond(
        &self,
        id: &str,
        gate: &Gate,
        extra: Option<&Mutex<Option<RepoError>>>,
    ) -> Result<ContentItem, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        gate.pass().await;
        let failure = extra
            .and_then(|failure| failure.lock().expect("writer lock").clone())
            .or_else(|| self.failure.lock().expect("writer lock").clone());
        match failure {
            Some(error) => Err(error),
            None => Ok(content_item(id)),
        }
    }
}

#[async_trait]
impl ContentWriteRepo for FakeWriter {
    async fn create(&self, _: ContentType, _: &NewContent) -> Result<ContentItem, RepoError> {
        self.respond("new", &self.gate, None).await
    }

    async fn update(
        &self,
        _: ContentType,
        id: &ItemId,
        _: &ContentPatch,
    ) -> Result<ContentItem, RepoError> {
        self.respond(id.as_str(), &self.update_gate, None).await
    }

    async fn delete(&self, _: ContentType, id: &ItemId, _: bool) -> Result<(), RepoError> {
        self.respond(id.as_str(), &self.gate, None)
            .await
            .map(|_| ())
    }

    async fn archive(&self, _: ContentType, id: &ItemId) -> Result<ContentItem, RepoError> {
        self.respond(id.as_str(), &self.gate, Some(&self.archive_failure))
            .await
    }

    async fn unarchive(&self, _: ContentType, id: &ItemId) -> Result<ContentItem, RepoError> {
        self.respond(id.as_str(), &self.gate, None).await
    }

    async fn restore(&self, _: ContentType, id: &ItemId) -> Result<ContentItem, RepoError> {
        self.respond(id.as_str(), &self.gate, None).await
    }
}

#[derive(Default)]
struct FakeLists {
    responses: Mutex<HashMap<QueryKey, ListResult>>,
    gate_first: AtomicBool,
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl FakeLists {
    fn respond_with(&self, key: &QueryKey, result: ListResult) {
        self.responses
            .lock()
            .expect("lists lock")
            .insert(key.clone(), result);
    }
}

#[async_trait]
impl ContentListRepo for FakeLists {
    async fn fetch_list(&self, key: &QueryKey) -> Result<ListResult, RepoError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .expect("lists lock")
            .get(key)
            .cloned()
            .unwrap_or_default();
        if call == 0 && self.gate_first.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(response)
    }
}

#[derive(Default)]
struct FakeTags {
    calls: AtomicUsize,
}

#[async_trait]
impl TagsRepo for FakeTags {
    async fn fetch_tag_usage(&self) -> Result<Vec<TagUsage>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![TagUsage {
            name: "x".to_string(),
            content_count: 1,
        }])
    }
}

struct Harness {
    service: ContentService,
    writer: Arc<FakeWriter>,
    lists: Arc<FakeLists>,
    tags: Arc<FakeTags>,
}

fn harness() -> Harness {
    let writer = Arc::new(FakeWriter::default());
    let lists = Arc::new(FakeLists::default());
    let tags = Arc::new(FakeTags::default());
    let service = ContentService::new(
        CacheConfig::default(),
        writer.clone(),
        lists.clone(),
        tags.clone(),
    );
    Harness {
        service,
        writer,
        lists,
        tags,
    }
}

fn archive(id: &str) -> MutationIntent {
    MutationIntent::Archive {
        id: ItemId::from(id),
    }
}

#[tokio::test]
async fn failed_archive_rolls_back_every_snapshotted_list() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    let aggregate = key(Domain::Content, Partition::Active);

    let active_before = store.set(active.clone(), list(&["a", "b"], 2));
    let aggregate_before = store.set(aggregate.clone(), list(&["a", "n1"], 2));

    h.writer.gate.armed.store(true, Ordering::SeqCst);
    h.writer.fail_with(RepoError::Status {
        status: 500,
        body: "boom".to_string(),
    });

    let service = h.service.clone();
    let pending =
        tokio::spawn(async move { service.mutate(ContentType::Bookmark, archive("a")).await });
    h.writer.gate.entered.notified().await;

    let optimistic = store.get(&active).expect("active list");
    assert_eq!(ids(&optimistic), vec!["b"]);
    assert_eq!(optimistic.total, 1);
    let optimistic_aggregate = store.get(&aggregate).expect("aggregate list");
    assert_eq!(ids(&optimistic_aggregate), vec!["n1"]);
    assert_eq!(optimistic_aggregate.total, 1);

    h.writer.gate.release.notify_one();
    let error = pending
        .await
        .expect("mutation task")
        .expect_err("write should fail");
    assert!(matches!(
        error,
        MutationError::TransientWriteFailure(RepoError::Status { status: 500, .. })
    ));

    let restored = store.get(&active).expect("active list");
    assert!(Arc::ptr_eq(&restored, &active_before));
    assert_eq!(ids(&restored), vec!["a", "b"]);
    assert_eq!(restored.total, 2);
    assert!(Arc::ptr_eq(
        &store.get(&aggregate).expect("aggregate list"),
        &aggregate_before
    ));
    assert!(!store.is_stale(&active));
}

#[tokio::test]
async fn successful_archive_commits_removal_and_marks_partitions_stale() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    let archived = key(Domain::Bookmark, Partition::Archived);
    let deleted = key(Domain::Bookmark, Partition::Deleted);
    let custom = key(Domain::Bookmark, Partition::custom("7"));
    let notes = key(Domain::Note, Partition::Active);
    let aggregate = key(Domain::Content, Partition::Active);

    store.set(active.clone(), list(&["a", "b"], 2));
    store.set(archived.clone(), list(&["c"], 1));
    store.set(deleted.clone(), list(&["d"], 1));
    store.set(custom.clone(), list(&["a"], 1));
    store.set(notes.clone(), list(&["n1"], 1));
    store.set(aggregate.clone(), list(&["a", "n1"], 2));

    let outcome = h
        .service
        .mutate(ContentType::Bookmark, archive("a"))
        .await
        .expect("archive settles");
    assert_eq!(
        outcome.item.map(|item| item.id),
        Some(ItemId::from("a"))
    );

    let committed = store.get(&active).expect("active list");
    assert_eq!(ids(&committed), vec!["b"]);
    assert_eq!(committed.total, 1);

    assert!(store.is_stale(&active));
    assert!(store.is_stale(&archived));
    assert!(store.is_stale(&custom));
    assert!(store.is_stale(&aggregate));
    assert!(!store.is_stale(&deleted));
    assert!(!store.is_stale(&notes));
    assert_eq!(h.writer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn field_patch_leaves_other_items_reference_equal() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    let before = store.set(active.clone(), list(&["a", "b"], 2));

    h.service
        .mutate(
            ContentType::Bookmark,
            MutationIntent::Update {
                id: ItemId::from("a"),
                patch: ContentPatch {
                    tags: Some(vec!["x".to_string()]),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("update settles");

    let after = store.get(&active).expect("active list");
    assert_eq!(after.items[0].tags, vec!["x".to_string()]);
    assert_eq!(after.items[0].title, before.items[0].title);
    assert!(Arc::ptr_eq(&after.items[1], &before.items[1]));
    assert_eq!(after.total, 2);
}

#[tokio::test]
async fn tag_usage_refreshes_only_when_tags_can_change() {
    let h = harness();

    h.service
        .mutate(
            ContentType::Note,
            MutationIntent::Update {
                id: ItemId::from("a"),
                patch: ContentPatch {
                    title: Some("new".to_string()),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("title update settles");
    h.service.wait_idle().await;
    assert_eq!(h.tags.calls.load(Ordering::SeqCst), 0);

    h.service
        .mutate(
            ContentType::Note,
            MutationIntent::Update {
                id: ItemId::from("a"),
                patch: ContentPatch {
                    tags: Some(vec!["x".to_string()]),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("tag update settles");
    h.service.wait_idle().await;
    assert_eq!(h.tags.calls.load(Ordering::SeqCst), 1);

    h.service
        .mutate(ContentType::Note, archive("a"))
        .await
        .expect("archive settles");
    h.service.wait_idle().await;
    assert_eq!(h.tags.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.service.store().tag_usage().map(|usage| usage.len()),
        Some(1)
    );
}

#[tokio::test]
async fn tag_usage_is_not_refreshed_after_a_failed_write() {
    let h = harness();
    h.writer.fail_with(RepoError::Timeout);

    let error = h
        .service
        .mutate(ContentType::Bookmark, archive("a"))
        .await
        .expect_err("write should fail");
    h.service.wait_idle().await;

    assert!(matches!(
        error,
        MutationError::TransientWriteFailure(RepoError::Timeout)
    ));
    assert_eq!(h.tags.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn permanent_delete_invalidates_only_the_trash() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    let archived = key(Domain::Bookmark, Partition::Archived);
    let deleted = key(Domain::Bookmark, Partition::Deleted);
    let custom = key(Domain::Bookmark, Partition::custom("7"));
    for list_key in [&active, &archived, &custom] {
        store.set(list_key.clone(), list(&["b"], 1));
    }
    store.set(deleted.clone(), list(&["a", "b"], 2));

    let outcome = h
        .service
        .mutate(
            ContentType::Bookmark,
            MutationIntent::Delete {
                id: ItemId::from("a"),
                permanent: true,
            },
        )
        .await
        .expect("purge settles");
    assert!(outcome.item.is_none());

    assert!(store.is_stale(&deleted));
    assert_eq!(ids(&store.get(&deleted).expect("trash")), vec!["b"]);
    assert!(!store.is_stale(&active));
    assert!(!store.is_stale(&archived));
    assert!(!store.is_stale(&custom));
}

#[tokio::test]
async fn soft_delete_invalidates_every_partition() {
    let h = harness();
    let store = h.service.store().clone();
    let keys = [
        key(Domain::Prompt, Partition::Active),
        key(Domain::Prompt, Partition::Archived),
        key(Domain::Prompt, Partition::Deleted),
        key(Domain::Prompt, Partition::custom("p")),
    ];
    for list_key in &keys {
        store.set(list_key.clone(), list(&["a"], 1));
    }

    h.service
        .mutate(
            ContentType::Prompt,
            MutationIntent::Delete {
                id: ItemId::from("a"),
                permanent: false,
            },
        )
        .await
        .expect("soft delete settles");

    for list_key in &keys {
        assert!(store.is_stale(list_key), "{list_key} should be stale");
    }
}

#[tokio::test]
async fn create_invalidates_active_and_saved_filters() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Note, Partition::Active);
    let archived = key(Domain::Note, Partition::Archived);
    let custom = key(Domain::Note, Partition::custom("9"));
    let before = store.set(active.clone(), list(&["a"], 1));
    store.set(archived.clone(), list(&["b"], 1));
    store.set(custom.clone(), list(&["a"], 1));

    let outcome = h
        .service
        .mutate(
            ContentType::Note,
            MutationIntent::Create(NewContent {
                title: Some("fresh".to_string()),
                ..Default::default()
            }),
        )
        .await
        .expect("create settles");

    assert_eq!(outcome.item.map(|item| item.id), Some(ItemId::from("new")));
    assert!(Arc::ptr_eq(
        &store.get(&active).expect("active list"),
        &before
    ));
    assert!(store.is_stale(&active));
    assert!(store.is_stale(&custom));
    assert!(!store.is_stale(&archived));
}

#[tokio::test]
async fn version_conflict_keeps_server_payload_and_rolls_back() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Note, Partition::Active);
    let before = store.set(active.clone(), list(&["a", "b"], 2));

    let payload = json!({
        "detail": { "server_version": 7, "message": "stale edit" },
        "current": { "title": "theirs" }
    });
    h.writer.fail_with(RepoError::Conflict(ConflictDetails::from_payload(
        payload.clone(),
    )));

    let error = h
        .service
        .mutate(
            ContentType::Note,
            MutationIntent::Update {
                id: ItemId::from("a"),
                patch: ContentPatch {
                    title: Some("mine".to_string()),
                    expected_version: Some(6),
                    ..Default::default()
                },
            },
        )
        .await
        .expect_err("conflict should fail");

    match error {
        MutationError::VersionConflict { id, details } => {
            assert_eq!(id, Some(ItemId::from("a")));
            assert_eq!(details.payload, payload);
            assert_eq!(details.server_version, Some(7));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(Arc::ptr_eq(
        &store.get(&active).expect("active list"),
        &before
    ));
}

#[tokio::test]
async fn observed_lists_are_refetched_after_settling() {
    let h = harness();
    let active = key(Domain::Bookmark, Partition::Active);
    h.lists.respond_with(&active, list(&["a", "b"], 2));

    let mut view = h.service.watch_list(active.clone());
    let first = view.loaded().await.expect("store alive");
    assert_eq!(ids(first.result().expect("loaded")), vec!["a", "b"]);

    h.lists.respond_with(&active, list(&["b", "c"], 2));
    h.service
        .mutate(ContentType::Bookmark, archive("a"))
        .await
        .expect("archive settles");
    h.service.wait_idle().await;

    let current = view.current();
    let refreshed = current.result().expect("refetched list");
    assert_eq!(ids(refreshed), vec!["b", "c"]);
    assert!(!h.service.store().is_stale(&active));
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn straggling_fetch_cannot_overwrite_the_optimistic_write() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    store.set(active.clone(), list(&["a", "b"], 2));
    let _view = h.service.watch_list(active.clone());

    h.lists.gate_first.store(true, Ordering::SeqCst);
    h.lists.respond_with(&active, list(&["a", "b", "z"], 3));
    h.service
        .invalidate(KeyPrefix::partition(Domain::Bookmark, Partition::Active));
    h.lists.entered.notified().await;
    assert!(store.is_fetching(&active));

    h.lists.respond_with(&active, list(&["b"], 1));
    h.service
        .mutate(ContentType::Bookmark, archive("a"))
        .await
        .expect("archive settles");
    h.lists.release.notify_one();
    h.service.wait_idle().await;

    let settled = store.get(&active).expect("active list");
    assert_eq!(ids(&settled), vec!["b"]);
    assert_eq!(settled.total, 1);
    assert!(!store.is_fetching(&active));
}

#[tokio::test]
async fn repeated_archive_decrements_total_once() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    store.set(active.clone(), list(&["a", "b"], 2));

    for _ in 0..2 {
        h.service
            .mutate(ContentType::Bookmark, archive("a"))
            .await
            .expect("archive settles");
    }

    let after = store.get(&active).expect("active list");
    assert_eq!(ids(&after), vec!["b"]);
    assert_eq!(after.total, 1);
}

#[tokio::test]
async fn partition_invalidation_reaches_every_parameter_variation() {
    let h = harness();
    let store = h.service.store().clone();
    let plain = key(Domain::Bookmark, Partition::Active);
    let searched = search_key(Domain::Bookmark, Partition::Active, "rust");
    let tagged = QueryKey::new(
        Domain::Bookmark,
        Partition::Active,
        ListParams::page(20, 20).with_tags(["x"]),
    );
    let archived = key(Domain::Bookmark, Partition::Archived);
    let notes = key(Domain::Note, Partition::Active);
    for list_key in [&plain, &searched, &tagged, &archived, &notes] {
        store.set(list_key.clone(), list(&["a"], 1));
    }

    h.service
        .invalidate(KeyPrefix::partition(Domain::Bookmark, Partition::Active));

    assert!(store.is_stale(&plain));
    assert!(store.is_stale(&searched));
    assert!(store.is_stale(&tagged));
    assert!(!store.is_stale(&archived));
    assert!(!store.is_stale(&notes));
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropping_the_caller_does_not_abandon_a_pending_mutation() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    store.set(active.clone(), list(&["a", "b"], 2));
    h.writer.gate.armed.store(true, Ordering::SeqCst);

    let service = h.service.clone();
    let caller =
        tokio::spawn(async move { service.mutate(ContentType::Bookmark, archive("a")).await });
    h.writer.gate.entered.notified().await;
    caller.abort();
    assert!(caller.await.expect_err("caller aborted").is_cancelled());

    h.writer.gate.release.notify_one();
    for _ in 0..1_000 {
        if store.is_stale(&active) {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(store.is_stale(&active));
    assert_eq!(ids(&store.get(&active).expect("active list")), vec!["b"]);
}

#[tokio::test]
async fn rollback_resumes_the_first_fetch_of_an_observed_list() {
    let h = harness();
    let store = h.service.store().clone();
    let archived = key(Domain::Bookmark, Partition::Archived);
    h.lists.respond_with(&archived, list(&["c"], 1));
    h.lists.gate_first.store(true, Ordering::SeqCst);
    h.writer.fail_with(RepoError::Timeout);

    let view = h.service.watch_list(archived.clone());
    h.lists.entered.notified().await;
    assert!(store.is_fetching(&archived));

    let error = h
        .service
        .mutate(ContentType::Bookmark, archive("a"))
        .await
        .expect_err("write should fail");
    assert!(matches!(
        error,
        MutationError::TransientWriteFailure(RepoError::Timeout)
    ));
    h.lists.release.notify_one();
    h.service.wait_idle().await;

    let state = view.current();
    assert!(!state.is_loading());
    assert_eq!(ids(state.result().expect("refetched list")), vec!["c"]);
    assert!(!store.is_fetching(&archived));
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fetch_started_while_pending_cannot_clear_the_settled_stale_mark() {
    let h = harness();
    let store = h.service.store().clone();
    let searched = search_key(Domain::Bookmark, Partition::Active, "x");
    h.lists.respond_with(&searched, list(&["a", "b"], 2));
    h.writer.gate.armed.store(true, Ordering::SeqCst);

    let service = h.service.clone();
    let pending =
        tokio::spawn(async move { service.mutate(ContentType::Bookmark, archive("a")).await });
    h.writer.gate.entered.notified().await;

    // Opened mid-write: this fetch reads the server before the archive commits.
    h.lists.gate_first.store(true, Ordering::SeqCst);
    let view = h.service.watch_list(searched.clone());
    h.lists.entered.notified().await;

    h.lists.respond_with(&searched, list(&["b"], 1));
    h.writer.gate.release.notify_one();
    pending
        .await
        .expect("mutation task")
        .expect("archive settles");
    h.lists.release.notify_one();
    h.service.wait_idle().await;

    let state = view.current();
    assert_eq!(ids(state.result().expect("refetched list")), vec!["b"]);
    assert!(!store.is_stale(&searched));
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn overlapping_mutations_on_one_item_roll_back_independently() {
    let h = harness();
    let store = h.service.store().clone();
    let active = key(Domain::Bookmark, Partition::Active);
    let before = store.set(active.clone(), list(&["a", "b"], 2));
    let _view = h.service.watch_list(active.clone());
    h.lists.respond_with(&active, list(&["a", "b"], 2));
    h.writer.gate.armed.store(true, Ordering::SeqCst);
    h.writer.update_gate.armed.store(true, Ordering::SeqCst);
    h.writer.fail_archives_with(RepoError::Status {
        status: 503,
        body: "busy".to_string(),
    });

    let service = h.service.clone();
    let archiving =
        tokio::spawn(async move { service.mutate(ContentType::Bookmark, archive("a")).await });
    h.writer.gate.entered.notified().await;
    assert_eq!(ids(&store.get(&active).expect("active list")), vec!["b"]);

    let service = h.service.clone();
    let renaming = tokio::spawn(async move {
        service
            .mutate(
                ContentType::Bookmark,
                MutationIntent::Update {
                    id: ItemId::from("a"),
                    patch: ContentPatch {
                        title: Some("renamed".to_string()),
                        ..Default::default()
                    },
                },
            )
            .await
    });
    h.writer.update_gate.entered.notified().await;
    assert_eq!(ids(&store.get(&active).expect("active list")), vec!["b"]);

    h.writer.gate.release.notify_one();
    archiving
        .await
        .expect("archive task")
        .expect_err("archive refused");

    // The archive restores its own snapshot while the rename is still pending.
    let rolled_back = store.get(&active).expect("active list");
    assert!(Arc::ptr_eq(&rolled_back, &before));
    assert!(!store.is_stale(&active));

    h.writer.update_gate.release.notify_one();
    renaming
        .await
        .expect("rename task")
        .expect("rename settles");
    h.service.wait_idle().await;

    let refreshed = store.get(&active).expect("active list");
    assert_eq!(ids(&refreshed), vec!["a", "b"]);
    assert!(!Arc::ptr_eq(&refreshed, &before));
    assert!(!store.is_stale(&active));
    assert_eq!(h.writer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 1);
}
