//! sqlchat storage crate - SQLite-backed key-value persistence.
//!
//! A WAL-mode SQLite file with versioned migrations behind a
//! [`KeyValueStore`](sqlchat_core::KeyValueStore) implementation.

pub mod migrations;
pub mod store;

pub use store::SqliteStore;
