//! Domain entities mirrored from the remote API's list projections.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::ContentType;

/// Opaque, stable identifier of a bookmark, note or prompt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One bookmark, note or prompt as it appears in a list projection.
///
/// Full bodies (note content, prompt template text) are only part of the detail
/// projection and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub title: Option<String>,
    /// Prompt identifier; absent for bookmarks and notes.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub archived_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub version: i64,
}

/// One page of a list query as returned by the server.
///
/// `total` is the server's count for the whole filter, so it is usually larger
/// than `items.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListResult {
    pub items: Vec<Arc<ContentItem>>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

impl ListResult {
    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.iter().any(|item| &item.id == id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Arc<ContentItem>> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn ids(&self) -> Vec<&ItemId> {
        self.items.iter().map(|item| &item.id).collect()
    }
}

/// Usage counter for a single tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub name: String,
    pub content_count: u64,
}

/// Create payload sent to a write endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update sent to a write endpoint. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

impl ContentPatch {
    /// The subset of this patch that is visible in list projections.
    pub fn list_fields(&self) -> ListPatch {
        ListPatch {
            title: self.title.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            tags: self.tags.clone(),
        }
    }

    pub fn touches_tags(&self) -> bool {
        self.tags.is_some()
    }
}

/// List-projection fields carried by an optimistic field patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPatch {
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ListPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.url.is_none()
            && self.tags.is_none()
    }

    /// Shallow-merge the carried fields into `item`.
    pub fn apply_to(&self, item: &ContentItem) -> ContentItem {
        let mut patched = item.clone();
        if let Some(title) = &self.title {
            patched.title = Some(title.clone());
        }
        if let Some(name) = &self.name {
            patched.name = Some(name.clone());
        }
        if let Some(description) = &self.description {
            patched.description = description.clone();
        }
        if let Some(url) = &self.url {
            patched.url = Some(url.clone());
        }
        if let Some(tags) = &self.tags {
            patched.tags = tags.clone();
        }
        patched
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}
