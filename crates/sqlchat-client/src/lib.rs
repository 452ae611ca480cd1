//! HTTP implementation of the query service boundary.
//!
//! Posts JSON to the configured endpoints and maps non-success responses to
//! business errors carrying the server's `error`/`detail` text.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use sqlchat_chat::{
    ApproveRequest, ApproveResponse, BackendError, IntentRequest, IntentResponse, KpiStrip,
    QueryBackend, QueryContext, SqlRequest, SqlResponse,
};
use sqlchat_core::config::BackendConfig;

/// Errors from constructing the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to create HTTP client: {0}")]
    Build(String),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TablesResponse {
    tables: Vec<String>,
}

/// `reqwest` client for the sqlchat query service.
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ClientError> {
        let base = config.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl(config.base_url.clone()));
        }

        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Wrap an existing client, e.g. one with custom TLS or proxy settings.
    pub fn with_client(client: reqwest::Client, config: BackendConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn get_json<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<R, BackendError>
    where
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, BackendError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(transport)?;
    map_body(status, &text)
}

/// Join a base URL and an endpoint path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    )
}

/// Map a status and raw body to a typed response or a backend error.
///
/// Non-success statuses become business errors. A success body that is
/// not the expected JSON is a transport-level failure.
pub fn map_body<R: DeserializeOwned>(status: u16, text: &str) -> Result<R, BackendError> {
    let body: Option<Value> = serde_json::from_str(text).ok();
    if !(200..300).contains(&status) {
        return Err(BackendError::business(status, body.unwrap_or(Value::Null)));
    }
    let body = body.ok_or_else(|| BackendError::Transport("response was not JSON".to_string()))?;
    serde_json::from_value(body)
        .map_err(|e| BackendError::Transport(format!("unexpected response shape: {}", e)))
}

/// Query parameters for the KPI strip.
pub fn kpi_query(context: &QueryContext) -> [(&'static str, &'static str); 3] {
    [
        ("region", context.region.code()),
        ("reporting_currency", context.currency.code()),
        ("stage_bucket", context.stage.as_str()),
    ]
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn resolve_intent(&self, request: &IntentRequest) -> Result<IntentResponse, BackendError> {
        self.post_json(&self.config.intent_path, request).await
    }

    async fn generate_sql(&self, request: &SqlRequest) -> Result<SqlResponse, BackendError> {
        self.post_json(&self.config.sql_path, request).await
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        let resp: TablesResponse = self.get_json(&self.config.tables_path, &[]).await?;
        Ok(resp.tables)
    }

    async fn kpi_strip(&self, context: &QueryContext) -> Result<KpiStrip, BackendError> {
        self.get_json(&self.config.kpi_path, &kpi_query(context)).await
    }

    async fn approve_example(&self, request: &ApproveRequest) -> Result<ApproveResponse, BackendError> {
        self.post_json(&self.config.examples_path, request).await
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}
