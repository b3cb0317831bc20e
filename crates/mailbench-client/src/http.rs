//! Remote mail service gateway over HTTP/JSON.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

use mailbench_core::{
    CoreError, CoreResult, ListRequest, Mail, MailOperationGateway, MailRequest, SearchRequest,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const CREATE_PATH: &str = "/api/mails";
const LIST_PATH: &str = "/api/mails/list";
const SEARCH_PATH: &str = "/api/mails/search";

/// Gateway that forwards every operation to a remote mail service.
#[derive(Debug, Clone)]
pub struct HttpMailGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMailGateway {
    /// Creates a gateway for `base_url` (scheme and host, no trailing path).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::TransportError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> CoreResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%url, "POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::TransportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::remote(status.as_u16(), body));
        }

        Ok(response)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> CoreResult<T> {
        self.post(path, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CoreError::DeserializationError(e.to_string()))
    }
}

#[async_trait]
impl MailOperationGateway for HttpMailGateway {
    fn backend(&self) -> &'static str {
        "api"
    }

    async fn create_mail(&self, request: &MailRequest) -> CoreResult<()> {
        self.post(CREATE_PATH, request).await.map(|_| ())
    }

    async fn list_mails(&self, request: &ListRequest) -> CoreResult<Vec<Mail>> {
        self.post_json(LIST_PATH, request).await
    }

    async fn search_mails(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        self.post_json(SEARCH_PATH, request).await
    }
}
