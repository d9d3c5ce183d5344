//! Mutation intents accepted by `ContentService::mutate`.

use std::fmt;

use crate::domain::entities::{ContentPatch, ItemId, NewContent};

/// What the caller wants the server to do to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationIntent {
    Create(NewContent),
    Update { id: ItemId, patch: ContentPatch },
    Delete { id: ItemId, permanent: bool },
    Archive { id: ItemId },
    Unarchive { id: ItemId },
    /// Bring an item back from the trash.
    Restore { id: ItemId },
}

impl MutationIntent {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationIntent::Create(_) => MutationKind::Create,
            MutationIntent::Update { .. } => MutationKind::Update,
            MutationIntent::Delete {
                permanent: false, ..
            } => MutationKind::SoftDelete,
            MutationIntent::Delete {
                permanent: true, ..
            } => MutationKind::PermanentDelete,
            MutationIntent::Archive { .. } => MutationKind::Archive,
            MutationIntent::Unarchive { .. } => MutationKind::Unarchive,
            MutationIntent::Restore { .. } => MutationKind::Restore,
        }
    }

    /// Target item; creates have none until the server assigns one.
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            MutationIntent::Create(_) => None,
            MutationIntent::Update { id, .. }
            | MutationIntent::Delete { id, .. }
            | MutationIntent::Archive { id }
            | MutationIntent::Unarchive { id }
            | MutationIntent::Restore { id } => Some(id),
        }
    }

    /// Whether a successful write may have changed tag usage counts.
    pub fn touches_tags(&self) -> bool {
        match self {
            MutationIntent::Update { patch, .. } => patch.touches_tags(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    SoftDelete,
    PermanentDelete,
    Archive,
    Unarchive,
    Restore,
}

impl MutationKind {
    pub const ALL: [MutationKind; 7] = [
        MutationKind::Create,
        MutationKind::Update,
        MutationKind::SoftDelete,
        MutationKind::PermanentDelete,
        MutationKind::Archive,
        MutationKind::Unarchive,
        MutationKind::Restore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::SoftDelete => "soft_delete",
            MutationKind::PermanentDelete => "permanent_delete",
            MutationKind::Archive => "archive",
            MutationKind::Unarchive => "unarchive",
            MutationKind::Restore => "restore",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_kind_follows_permanent_flag() {
        let soft = MutationIntent::Delete {
            id: ItemId::from("a"),
            permanent: false,
        };
        let hard = MutationIntent::Delete {
            id: ItemId::from("a"),
            permanent: true,
        };

        assert_eq!(soft.kind(), MutationKind::SoftDelete);
        assert_eq!(hard.kind(), MutationKind::PermanentDelete);
    }

    #[test]
    fn only_tag_patches_touch_tags_among_updates() {
        let title_only = MutationIntent::Update {
            id: ItemId::from("a"),
            patch: ContentPatch {
                title: Some("t".to_string()),
                ..Default::default()
            },
        };
        let with_tags = MutationIntent::Update {
            id: ItemId::from("a"),
            patch: ContentPatch {
                tags: Some(Vec::new()),
                ..Default::default()
            },
        };

        assert!(!title_only.touches_tags());
        assert!(with_tags.touches_tags());
        assert!(MutationIntent::Archive { id: ItemId::from("a") }.touches_tags());
    }

    #[test]
    fn create_has_no_target() {
        let intent = MutationIntent::Create(NewContent::default());
        assert!(intent.item_id().is_none());
        assert_eq!(intent.kind().as_str(), "create");
    }
}
