//! Presentation selection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a successful result is rendered in the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    #[default]
    Text,
    Table,
    Bar,
    Line,
}

impl Presentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presentation::Text => "text",
            Presentation::Table => "table",
            Presentation::Bar => "bar",
            Presentation::Line => "line",
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self, Presentation::Bar | Presentation::Line)
    }
}

impl std::fmt::Display for Presentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Choose a representation. An explicit hint always beats keywords in the
/// question; both are matched case-insensitively.
pub fn choose_presentation(question: &str, hint: Option<&str>) -> Presentation {
    let hint = hint.unwrap_or_default().to_lowercase();
    let q = question.to_lowercase();

    if hint.contains("bar") {
        Presentation::Bar
    } else if hint.contains("line") {
        Presentation::Line
    } else if hint.contains("table") {
        Presentation::Table
    } else if hint.contains("text") || hint.contains("summary") {
        Presentation::Text
    } else if q.contains("bar chart") {
        Presentation::Bar
    } else if q.contains("line chart") {
        Presentation::Line
    } else if q.contains("table") {
        Presentation::Table
    } else {
        Presentation::Text
    }
}

/// The `presentation` hint carried by an intent object, if it is a string.
pub fn presentation_hint(intent: &Value) -> Option<&str> {
    intent.get("presentation").and_then(Value::as_str)
}
