//! Error types for the conversational query engine.

use sqlchat_core::SqlChatError;

use crate::state::PipelinePhase;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("question exceeds maximum length of {0} characters")]
    QuestionTooLong(usize),
    #[error("no question is waiting for a stage selection")]
    NoPendingQuestion,
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("message not found: {0}")]
    MessageNotFound(uuid::Uuid),
    #[error("invalid pipeline transition: {0} -> {1}")]
    InvalidTransition(PipelinePhase, PipelinePhase),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<SqlChatError> for ChatError {
    fn from(err: SqlChatError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
