//! Repository traits describing the remote API the cache sits in front of.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::cache::QueryKey;
use crate::domain::entities::{ContentItem, ContentPatch, ItemId, ListResult, NewContent, TagUsage};
use crate::domain::types::ContentType;

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("resource not found")]
    NotFound,
    #[error("version conflict (server version {:?})", .0.server_version)]
    Conflict(ConflictDetails),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl RepoError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Server payload attached to a version conflict, kept exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDetails {
    pub server_version: Option<i64>,
    pub payload: Value,
}

impl ConflictDetails {
    pub fn from_payload(payload: Value) -> Self {
        let server_version = payload
            .get("server_version")
            .or_else(|| payload.pointer("/detail/server_version"))
            .and_then(Value::as_i64);
        Self {
            server_version,
            payload,
        }
    }
}

/// Write endpoints, one set per content type.
#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    async fn create(
        &self,
        content_type: ContentType,
        content: &NewContent,
    ) -> Result<ContentItem, RepoError>;

    async fn update(
        &self,
        content_type: ContentType,
        id: &ItemId,
        patch: &ContentPatch,
    ) -> Result<ContentItem, RepoError>;

    async fn delete(
        &self,
        content_type: ContentType,
        id: &ItemId,
        permanent: bool,
    ) -> Result<(), RepoError>;

    async fn archive(&self, content_type: ContentType, id: &ItemId)
    -> Result<ContentItem, RepoError>;

    async fn unarchive(
        &self,
        content_type: ContentType,
        id: &ItemId,
    ) -> Result<ContentItem, RepoError>;

    async fn restore(&self, content_type: ContentType, id: &ItemId)
    -> Result<ContentItem, RepoError>;
}

/// Fetch layer for list queries.
#[async_trait]
pub trait ContentListRepo: Send + Sync {
    async fn fetch_list(&self, key: &QueryKey) -> Result<ListResult, RepoError>;
}

/// Tag aggregate endpoint.
#[async_trait]
pub trait TagsRepo: Send + Sync {
    async fn fetch_tag_usage(&self) -> Result<Vec<TagUsage>, RepoError>;
}
