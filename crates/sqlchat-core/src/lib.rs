pub mod config;
pub mod error;
pub mod kv;
pub mod types;

pub use config::SqlChatConfig;
pub use error::{Result, SqlChatError};
pub use kv::{load_json, save_json, KeyValueStore, MemoryStore};
pub use types::*;
