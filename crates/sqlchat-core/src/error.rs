use thiserror::Error;

/// Top-level error type for sqlchat.
///
/// Subsystem crates define their own error types and implement
/// `From<SqlChatError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqlChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl From<toml::de::Error> for SqlChatError {
    fn from(err: toml::de::Error) -> Self {
        SqlChatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SqlChatError {
    fn from(err: toml::ser::Error) -> Self {
        SqlChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SqlChatError {
    fn from(err: serde_json::Error) -> Self {
        SqlChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for sqlchat operations.
pub type Result<T> = std::result::Result<T, SqlChatError>;
