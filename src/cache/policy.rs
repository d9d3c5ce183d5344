//! Static invalidation and optimistic-rewrite policy per mutation kind.

use crate::application::content::{MutationIntent, MutationKind};
use crate::domain::types::ContentType;

use super::keys::{Domain, KeyPrefix, Partition, PartitionSelector};
use super::transform::ListTransform;

/// A partition family marked stale after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaleTarget {
    Active,
    Archived,
    Deleted,
    /// Every saved-filter partition.
    Custom,
}

impl StaleTarget {
    pub fn selector(self) -> PartitionSelector {
        match self {
            StaleTarget::Active => PartitionSelector::Exact(Partition::Active),
            StaleTarget::Archived => PartitionSelector::Exact(Partition::Archived),
            StaleTarget::Deleted => PartitionSelector::Exact(Partition::Deleted),
            StaleTarget::Custom => PartitionSelector::AnyCustom,
        }
    }

    pub fn prefix(self, domain: Domain) -> KeyPrefix {
        KeyPrefix {
            domain,
            partition: Some(self.selector()),
        }
    }
}

use StaleTarget::{Active, Archived, Custom, Deleted};

pub fn invalidation_targets(kind: MutationKind) -> &'static [StaleTarget] {
    match kind {
        MutationKind::Create => &[Active, Custom],
        MutationKind::Update => &[Active, Archived, Custom],
        MutationKind::SoftDelete => &[Active, Archived, Deleted, Custom],
        // A purged item only ever lived in the trash.
        MutationKind::PermanentDelete => &[Deleted],
        MutationKind::Archive | MutationKind::Unarchive => &[Active, Archived, Custom],
        MutationKind::Restore => &[Active, Deleted, Custom],
    }
}

/// Whether tag usage must be refetched once a mutation of `kind` succeeds.
pub fn refreshes_tag_usage(kind: MutationKind, tags_changed: bool) -> bool {
    match kind {
        MutationKind::Update => tags_changed,
        _ => true,
    }
}

/// Domains whose lists can show an item of `content_type`.
pub fn affected_domains(content_type: ContentType) -> [Domain; 2] {
    [Domain::from(content_type), Domain::Content]
}

/// Prefixes cancelled, snapshotted and rewritten before the write call.
pub fn optimistic_prefixes(content_type: ContentType) -> Vec<KeyPrefix> {
    affected_domains(content_type)
        .into_iter()
        .map(KeyPrefix::all)
        .collect()
}

/// Prefixes marked stale once the write has succeeded.
pub fn stale_prefixes(content_type: ContentType, kind: MutationKind) -> Vec<KeyPrefix> {
    affected_domains(content_type)
        .into_iter()
        .flat_map(|domain| {
            invalidation_targets(kind)
                .iter()
                .map(move |target| target.prefix(domain))
        })
        .collect()
}

/// The rewrite shown before the server answers; creates have none.
pub fn optimistic_transform(intent: &MutationIntent) -> Option<ListTransform> {
    match intent {
        MutationIntent::Create(_) => None,
        MutationIntent::Update { id, patch } => Some(ListTransform::PatchFields {
            id: id.clone(),
            fields: patch.list_fields(),
        }),
        MutationIntent::Delete { id, .. }
        | MutationIntent::Archive { id }
        | MutationIntent::Unarchive { id }
        | MutationIntent::Restore { id } => Some(ListTransform::Remove(id.clone())),
    }
}
