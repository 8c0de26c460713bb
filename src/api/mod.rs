//! HTTP client for the conversation backend.
//!
//! This module provides:
//! - `Backend`, the seam the store talks through (one method per endpoint)
//! - `ApiClient`, its reqwest implementation
//! - Wire types, configuration, errors
//! - The incremental chat reply reader

pub mod config;
pub mod error;
pub mod stream;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use stream::{ChatStream, HttpChatStream, Utf8ChunkDecoder};
pub use types::{
    Analysis, ChatRequest, Conversation, ConversationDetail, ConversationId, Message,
    SearchRequest, Sender,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Operations the conversation backend exposes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /conversations/`, newest first.
    async fn list_conversations(&self) -> ApiResult<Vec<Conversation>>;

    /// `GET /conversations/{id}/` with the full message history.
    async fn get_conversation(&self, id: ConversationId) -> ApiResult<ConversationDetail>;

    /// `POST /chat/`. Resolves once response headers arrive; the body is read
    /// through the returned stream.
    async fn open_chat(&self, request: &ChatRequest) -> ApiResult<Box<dyn ChatStream>>;

    /// `POST /conversations/{id}/analyze/`. A missing id is sent as `null`.
    async fn analyze(&self, id: Option<ConversationId>) -> ApiResult<Analysis>;

    /// `POST /search/`.
    async fn search(&self, query: &str) -> ApiResult<Vec<Conversation>>;
}

/// Path segment for an optional conversation id, as a template string renders it.
fn id_segment(id: Option<ConversationId>) -> String {
    id.map_or_else(|| "null".to_string(), |id| id.to_string())
}

/// reqwest-backed `Backend`.
#[derive(Clone, Debug)]
pub struct ApiClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let client = Self::build_client(&config)?;
        Ok(Self { config, client })
    }

    /// Create a client with default configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> ApiResult<Self> {
        Self::new(ApiConfig::default())
    }

    /// Create a client configured from the environment.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ApiConfig::from_env())
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn build_client(config: &ApiConfig) -> ApiResult<reqwest::Client> {
        use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

        let mut headers = HeaderMap::new();

        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain;q=0.9, */*;q=0.8"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))
    }

    /// Fail on any non-2xx status.
    fn check_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }

    /// Send a request and parse the JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = Self::check_status(request.send().await?)?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(ApiError::EmptyBody);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn list_conversations(&self) -> ApiResult<Vec<Conversation>> {
        let url = self.config.endpoint("conversations/")?;
        tracing::debug!(%url, "listing conversations");
        self.send_json(self.client.get(url)).await
    }

    async fn get_conversation(&self, id: ConversationId) -> ApiResult<ConversationDetail> {
        let url = self.config.endpoint(&format!("conversations/{id}/"))?;
        tracing::debug!(%url, conversation_id = %id, "fetching conversation");
        self.send_json(self.client.get(url)).await
    }

    async fn open_chat(&self, request: &ChatRequest) -> ApiResult<Box<dyn ChatStream>> {
        let url = self.config.endpoint("chat/")?;
        tracing::debug!(
            %url,
            conversation_id = ?request.conversation_id,
            "opening chat stream"
        );
        let response = self.client.post(url).json(request).send().await?;
        let response = Self::check_status(response)?;
        Ok(Box::new(HttpChatStream::new(response)))
    }

    async fn analyze(&self, id: Option<ConversationId>) -> ApiResult<Analysis> {
        let url = self
            .config
            .endpoint(&format!("conversations/{}/analyze/", id_segment(id)))?;
        tracing::debug!(%url, "analyzing conversation");
        self.send_json(self.client.post(url)).await
    }

    async fn search(&self, query: &str) -> ApiResult<Vec<Conversation>> {
        let url = self.config.endpoint("search/")?;
        tracing::debug!(%url, query, "searching conversations");
        let body = SearchRequest {
            query: query.to_string(),
        };
        self.send_json(self.client.post(url).json(&body)).await
    }
}
