//! reqwest adapter for the remote bookmarks/notes/prompts API.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::repos::{
    ConflictDetails, ContentListRepo, ContentWriteRepo, RepoError, TagsRepo,
};
use crate::cache::{Domain, Partition, QueryKey};
use crate::config::ApiSettings;
use crate::domain::entities::{ContentItem, ContentPatch, ItemId, ListResult, NewContent, TagUsage};
use crate::domain::types::ContentType;
use crate::infra::error::InfraError;

#[derive(Debug, Deserialize)]
struct TagListResponse {
    tags: Vec<TagUsage>,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            token: settings.token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("shelfmark/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RepoError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RepoError::transport(format!("base URL `{}` cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RepoError> {
        let request = request.build().map_err(map_transport)?;
        let method = request.method().clone();
        let url = request.url().clone();
        let started = Instant::now();

        let response = self.client.execute(request).await.map_err(map_transport)?;
        debug!(
            %method,
            url = %url,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "API request finished"
        );

        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RepoError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(map_transport)?;
        serde_json::from_slice(&bytes).map_err(RepoError::decode)
    }

    async fn item_action(
        &self,
        content_type: ContentType,
        id: &ItemId,
        action: &str,
    ) -> Result<ContentItem, RepoError> {
        let url = self.endpoint(&[collection(content_type), id.as_str(), action])?;
        self.send_json(self.request(Method::POST, url)).await
    }
}

#[async_trait]
impl ContentWriteRepo for ApiClient {
    async fn create(
        &self,
        content_type: ContentType,
        content: &NewContent,
    ) -> Result<ContentItem, RepoError> {
        let url = self.endpoint(&[collection(content_type), ""])?;
        self.send_json(self.request(Method::POST, url).json(content))
            .await
    }

    async fn update(
        &self,
        content_type: ContentType,
        id: &ItemId,
        patch: &ContentPatch,
    ) -> Result<ContentItem, RepoError> {
        let url = self.endpoint(&[collection(content_type), id.as_str()])?;
        self.send_json(self.request(Method::PATCH, url).json(patch))
            .await
    }

    async fn delete(
        &self,
        content_type: ContentType,
        id: &ItemId,
        permanent: bool,
    ) -> Result<(), RepoError> {
        let mut url = self.endpoint(&[collection(content_type), id.as_str()])?;
        if permanent {
            url.query_pairs_mut().append_pair("permanent", "true");
        }
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn archive(&self, content_type: ContentType, id: &ItemId) -> Result<ContentItem, RepoError> {
        self.item_action(content_type, id, "archive").await
    }

    async fn unarchive(
        &self,
        content_type: ContentType,
        id: &ItemId,
    ) -> Result<ContentItem, RepoError> {
        self.item_action(content_type, id, "unarchive").await
    }

    async fn restore(&self, content_type: ContentType, id: &ItemId) -> Result<ContentItem, RepoError> {
        self.item_action(content_type, id, "restore").await
    }
}

#[async_trait]
impl ContentListRepo for ApiClient {
    async fn fetch_list(&self, key: &QueryKey) -> Result<ListResult, RepoError> {
        let mut url = self.endpoint(&[domain_collection(key.domain), ""])?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in list_query(key) {
                pairs.append_pair(name, &value);
            }
        }
        self.send_json(self.request(Method::GET, url)).await
    }
}

#[async_trait]
impl TagsRepo for ApiClient {
    async fn fetch_tag_usage(&self) -> Result<Vec<TagUsage>, RepoError> {
        let url = self.endpoint(&["tags", ""])?;
        let response: TagListResponse = self.send_json(self.request(Method::GET, url)).await?;
        Ok(response.tags)
    }
}

fn collection(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Bookmark => "bookmarks",
        ContentType::Note => "notes",
        ContentType::Prompt => "prompts",
    }
}

fn domain_collection(domain: Domain) -> &'static str {
    match domain {
        Domain::Bookmark => collection(ContentType::Bookmark),
        Domain::Note => collection(ContentType::Note),
        Domain::Prompt => collection(ContentType::Prompt),
        Domain::Content => "content",
    }
}

/// Query-string pairs for one list key, in a stable order.
fn list_query(key: &QueryKey) -> Vec<(&'static str, String)> {
    let params = &key.params;
    let mut query = Vec::new();

    match &key.partition {
        Partition::Active => query.push(("view", "active".to_string())),
        Partition::Archived => query.push(("view", "archived".to_string())),
        Partition::Deleted => query.push(("view", "deleted".to_string())),
        Partition::Custom(filter_id) => query.push(("filter_id", filter_id.clone())),
    }
    if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
        query.push(("q", search.to_string()));
    }
    if !params.tags.is_empty() {
        query.extend(params.tags.iter().map(|tag| ("tags", tag.clone())));
        query.push(("tag_match", params.tag_match.as_str().to_string()));
    }
    if let Some(sort_by) = params.sort_by {
        query.push(("sort_by", sort_by.as_str().to_string()));
    }
    if let Some(sort_order) = params.sort_order {
        query.push(("sort_order", sort_order.as_str().to_string()));
    }
    query.push(("offset", params.offset.to_string()));
    if params.limit > 0 {
        query.push(("limit", params.limit.to_string()));
    }
    if key.domain == Domain::Content {
        query.extend(
            params
                .content_types
                .iter()
                .map(|content_type| ("content_types", content_type.as_str().to_string())),
        );
    }

    query
}

async fn check_status(response: Response) -> Result<Response, RepoError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await.map_err(map_transport)?;
    match status {
        StatusCode::NOT_FOUND => Err(RepoError::NotFound),
        StatusCode::CONFLICT => {
            let payload = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            });
            Err(RepoError::Conflict(ConflictDetails::from_payload(payload)))
        }
        _ => Err(RepoError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }),
    }
}

fn map_transport(err: reqwest::Error) -> RepoError {
    if err.is_timeout() {
        RepoError::Timeout
    } else if err.is_decode() {
        RepoError::decode(err)
    } else {
        RepoError::transport(err)
    }
}
