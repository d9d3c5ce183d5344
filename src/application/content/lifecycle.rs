//! Per-mutation controller: Idle → Pending → {Settled | RolledBack}.
//!
//! The optimistic phase (cancel, snapshot, rewrite) happens in `begin`. From
//! then on the controller owns the snapshot until `settle` discards it or
//! `roll_back` restores it. Consuming `self` in both keeps a settled mutation
//! from being rolled back and the reverse.

use std::fmt;
use std::time::Instant;

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheTrigger, QueryKey, Refetcher, Restored, Snapshot, policy};
use crate::domain::types::ContentType;

use super::intent::{MutationIntent, MutationKind};

const METRIC_MUTATION_TOTAL: &str = "shelfmark_mutation_total";
const METRIC_MUTATION_MS: &str = "shelfmark_mutation_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Pending,
    Settled,
    RolledBack,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Pending => "pending",
            LifecycleState::Settled => "settled",
            LifecycleState::RolledBack => "rolled_back",
        })
    }
}

/// Identity of one mutation invocation, carried through logs and metrics.
#[derive(Debug, Clone)]
pub struct MutationTicket {
    pub id: Uuid,
    pub epoch: u64,
    pub kind: MutationKind,
    pub content_type: ContentType,
    pub started_at: OffsetDateTime,
    started: Instant,
}

impl MutationTicket {
    pub fn new(epoch: u64, kind: MutationKind, content_type: ContentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            content_type,
            started_at: OffsetDateTime::now_utc(),
            started: Instant::now(),
        }
    }

    fn record(&self, outcome: &'static str) {
        counter!(
            METRIC_MUTATION_TOTAL,
            "kind" => self.kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(METRIC_MUTATION_MS, "kind" => self.kind.as_str())
            .record(self.started.elapsed().as_secs_f64() * 1000.0);
    }
}

pub struct MutationController<'a> {
    ticket: MutationTicket,
    refetcher: &'a Refetcher,
    state: LifecycleState,
    snapshot: Option<Snapshot>,
}

impl<'a> MutationController<'a> {
    pub fn new(ticket: MutationTicket, refetcher: &'a Refetcher) -> Self {
        Self {
            ticket,
            refetcher,
            state: LifecycleState::Idle,
            snapshot: None,
        }
    }

    /// Idle → Pending: cancel competing fetches, snapshot, rewrite optimistically.
    pub fn begin(&mut self, intent: &MutationIntent) {
        debug_assert_eq!(self.state, LifecycleState::Idle);
        let prefixes = policy::optimistic_prefixes(self.ticket.content_type);
        let transform = policy::optimistic_transform(intent);
        self.snapshot = Some(
            self.refetcher
                .store()
                .begin_optimistic(&prefixes, transform.as_ref()),
        );
        self.state = LifecycleState::Pending;

        info!(
            mutation_id = %self.ticket.id,
            mutation_epoch = self.ticket.epoch,
            kind = %self.ticket.kind,
            content_type = %self.ticket.content_type,
            item_id = intent.item_id().map(|id| id.as_str()),
            "Mutation pending"
        );
    }

    /// Pending → Settled: drop the snapshot and invalidate per policy.
    pub fn settle(mut self, trigger: &CacheTrigger, tags_changed: bool) -> MutationTicket {
        self.snapshot = None;
        self.state = LifecycleState::Settled;
        trigger.mutation_settled(self.ticket.content_type, self.ticket.kind, tags_changed);

        info!(
            mutation_id = %self.ticket.id,
            kind = %self.ticket.kind,
            "Mutation settled"
        );
        self.ticket.record("settled");
        self.ticket.clone()
    }

    /// Pending → RolledBack: put every snapshotted entry back verbatim.
    ///
    /// Observed lists whose fetch was cancelled by `begin` are fetched again.
    pub fn roll_back(mut self, outcome: &'static str, reason: &dyn fmt::Display) -> MutationTicket {
        let restored = self.restore();
        let refetched = self.refetch(restored.refetch);
        warn!(
            mutation_id = %self.ticket.id,
            kind = %self.ticket.kind,
            restored = restored.changed,
            refetched,
            reason = %reason,
            "Mutation rolled back"
        );
        self.ticket.record(outcome);
        self.ticket.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn ticket(&self) -> &MutationTicket {
        &self.ticket
    }

    fn restore(&mut self) -> Restored {
        self.state = LifecycleState::RolledBack;
        self.snapshot
            .take()
            .map(|snapshot| self.refetcher.store().restore(snapshot))
            .unwrap_or_default()
    }

    fn refetch(&self, keys: Vec<QueryKey>) -> usize {
        let count = keys.len();
        for key in keys {
            self.refetcher.refetch_list(key);
        }
        count
    }
}

impl Drop for MutationController<'_> {
    fn drop(&mut self) {
        // Unwinding out of the write call leaves the controller pending.
        if self.state == LifecycleState::Pending {
            let restored = self.restore();
            // Spawning a refetch needs a runtime.
            let refetched = if Handle::try_current().is_ok() {
                self.refetch(restored.refetch)
            } else {
                0
            };
            warn!(
                mutation_id = %self.ticket.id,
                kind = %self.ticket.kind,
                restored = restored.changed,
                refetched,
                "Mutation abandoned while pending; optimistic state rolled back"
            );
            self.ticket.record("abandoned");
        }
    }
}
