//! [`KeyValueStore`] over the SQLite `kv_entries` table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use sqlchat_core::{KeyValueStore, SqlChatError};

use crate::migrations;

/// SQLite-backed persistence for client state. One connection, serialized
/// behind a mutex; reads and writes are single statements.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at `path`, creating the file and parent directories
    /// if needed. The file is put in WAL mode.
    pub fn open(path: &Path) -> Result<Self, SqlChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage("open database"))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(storage("set pragmas"))?;
        info!(path = %path.display(), "State database opened");
        Self::with_schema(conn)
    }

    pub fn in_memory() -> Result<Self, SqlChatError> {
        Self::with_schema(Connection::open_in_memory().map_err(storage("open in-memory db"))?)
    }

    fn with_schema(conn: Connection) -> Result<Self, SqlChatError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SqlChatError> {
        self.conn
            .lock()
            .map_err(|e| SqlChatError::Storage(format!("store lock poisoned: {}", e)))
    }
}

fn storage(what: &'static str) -> impl Fn(rusqlite::Error) -> SqlChatError {
    move |e| SqlChatError::Storage(format!("Failed to {}: {}", what, e))
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, SqlChatError> {
        self.conn()?
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SqlChatError::Storage(format!("Failed to read {}: {}", key, e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SqlChatError> {
        self.conn()?
            .execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, value],
            )
            .map_err(|e| SqlChatError::Storage(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SqlChatError> {
        self.conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map_err(|e| SqlChatError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}
