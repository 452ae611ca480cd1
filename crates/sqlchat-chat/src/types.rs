//! Session and message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sqlchat_core::{StageBucket, StageOption};

/// Name given to freshly created sessions until the first user message.
pub const DEFAULT_SESSION_NAME: &str = "New chat";

/// Text of the stage disambiguation prompt.
pub const STAGE_PROMPT_TEXT: &str = "Which stage scope should I use?";

// =============================================================================
// Message
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Discriminant of a message's structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    BarChart,
    LineChart,
    Table,
    StagePrompt,
}

/// One series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Categorical chart data derived from a tabular result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Name of the category column the labels came from.
    pub category: String,
    /// Series names, in order.
    pub metrics: Vec<String>,
}

/// A raw tabular result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Structured payload attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Attachment {
    BarChart(ChartData),
    LineChart(ChartData),
    Table(TableData),
    StagePrompt(Vec<StageOption>),
}

impl Attachment {
    pub fn kind(&self) -> MessageKind {
        match self {
            Attachment::BarChart(_) => MessageKind::BarChart,
            Attachment::LineChart(_) => MessageKind::LineChart,
            Attachment::Table(_) => MessageKind::Table,
            Attachment::StagePrompt(_) => MessageKind::StagePrompt,
        }
    }
}

/// A single entry in a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, attachment: Option<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            at: Utc::now(),
            attachment,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, None)
    }

    pub fn assistant_with(content: impl Into<String>, attachment: Attachment) -> Self {
        Self::new(Role::Assistant, content, Some(attachment))
    }

    /// The assistant prompt listing the seven stage options.
    pub fn stage_prompt() -> Self {
        Self::assistant_with(
            STAGE_PROMPT_TEXT,
            Attachment::StagePrompt(StageBucket::options()),
        )
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.attachment.as_ref().map(Attachment::kind)
    }

    pub fn is_stage_prompt(&self) -> bool {
        self.kind() == Some(MessageKind::StagePrompt)
    }
}

// =============================================================================
// Session
// =============================================================================

/// An ordered, append-mostly conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub welcome_shown: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: DEFAULT_SESSION_NAME.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
            welcome_shown: false,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Sidebar entry for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub name: String,
    /// First 44 characters of the last message, or "No messages".
    pub preview: String,
    pub message_count: usize,
    pub active: bool,
}
