//! Remote query service boundary.
//!
//! The orchestrator only talks to the reasoning pipeline through
//! [`QueryBackend`]. Request and response bodies mirror the JSON wire
//! format; every response field is optional on the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::QueryContext;
use crate::kpi::KpiStrip;

/// Route used when neither the intent response nor the intent names one.
pub const DEFAULT_ROUTE: &str = "normal_intent";

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Network unreachable, connection reset, or an unreadable body.
    #[error("Failed to fetch")]
    Transport(String),
    /// The request was aborted before a response was observed.
    #[error("Cancelled")]
    Cancelled,
    /// Non-success response. `message` is the server's `error`/`detail` text.
    #[error("{}", display_business(.status, .message))]
    Business {
        status: u16,
        message: String,
        body: Value,
    },
}

fn display_business(status: &u16, message: &str) -> String {
    if message.is_empty() {
        format!("request failed with status {}", status)
    } else {
        message.to_string()
    }
}

impl BackendError {
    /// Build a business error from a non-success body, preferring `error`
    /// over `detail`.
    pub fn business(status: u16, body: Value) -> Self {
        let message = ["error", "detail"]
            .iter()
            .filter_map(|k| body.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string();
        BackendError::Business {
            status,
            message,
            body,
        }
    }

    /// Server-supplied error text, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            BackendError::Business { message, .. } if !message.is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentRequest {
    pub query: String,
    #[serde(flatten)]
    pub context: QueryContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentResponse {
    pub intent: Value,
    pub route: Option<String>,
}

impl IntentResponse {
    /// Route for the second phase: the response's `route`, else the
    /// intent's `_route`, else [`DEFAULT_ROUTE`].
    pub fn resolved_route(&self) -> String {
        self.route
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| {
                self.intent
                    .get("_route")
                    .and_then(Value::as_str)
                    .filter(|r| !r.is_empty())
            })
            .unwrap_or(DEFAULT_ROUTE)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlRequest {
    pub intent: Value,
    pub route: String,
    pub question: String,
    #[serde(flatten)]
    pub context: QueryContext,
    pub include_narrative: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlResponse {
    pub sql: Option<String>,
    pub prompt: Option<String>,
    pub llm_raw: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub narrative: Option<String>,
    pub route_used: Option<String>,
    /// Any other fields the service returned, kept for debugging.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApproveRequest {
    pub question: String,
    pub sql: String,
    pub tags: Vec<String>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproveResponse {
    pub id: Value,
}

// =============================================================================
// Trait
// =============================================================================

/// The remote services a conversation depends on.
///
/// Implementations must be cancel-safe: the orchestrator drops an in-flight
/// future when its run is cancelled or superseded.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Phase one: question to structured intent.
    async fn resolve_intent(&self, request: &IntentRequest) -> Result<IntentResponse, BackendError>;

    /// Phase two: intent to SQL, executed, with an optional narrative.
    async fn generate_sql(&self, request: &SqlRequest) -> Result<SqlResponse, BackendError>;

    async fn list_tables(&self) -> Result<Vec<String>, BackendError>;

    async fn kpi_strip(&self, context: &QueryContext) -> Result<KpiStrip, BackendError>;

    async fn approve_example(&self, request: &ApproveRequest) -> Result<ApproveResponse, BackendError>;
}
