//! Shared domain enumerations aligned with the remote API's enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three entity kinds the client manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Bookmark,
    Note,
    Prompt,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Bookmark => "bookmark",
            ContentType::Note => "note",
            ContentType::Prompt => "prompt",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a tag filter combines multiple tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    #[default]
    All,
    Any,
}

impl TagMatch {
    pub fn as_str(self) -> &'static str {
        match self {
            TagMatch::All => "all",
            TagMatch::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    LastUsedAt,
    ArchivedAt,
    DeletedAt,
    Title,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::LastUsedAt => "last_used_at",
            SortField::ArchivedAt => "archived_at",
            SortField::DeletedAt => "deleted_at",
            SortField::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}
