//! SQLite-backed key-value store.
//!
//! Values are stored as JSON text in a single `kv` table at
//! `~/.config/focusguard/focusguard.db`. Change notifications are delivered
//! to subscribers in this process only; writes from other processes are seen
//! on the next read.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{data_dir, KeyValueStore, StoreChange};
use crate::error::StoreError;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open the store at `~/.config/focusguard/focusguard.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::OpenFailed {
            path: Path::new("~/.config/focusguard").to_path_buf(),
            message: e.to_string(),
        })?;
        Self::open(&dir.join("focusguard.db"))
    }

    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        // The CLI and a running daemon share the file.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        let (changes, _) = broadcast::channel(256);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn read(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| unavailable(key, e))?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StoreError::Malformed {
                    key: key.to_string(),
                    source,
                }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(unavailable(key, e)),
        }
    }

    fn publish(&self, change: StoreChange) {
        if let Err(e) = self.changes.send(change) {
            tracing::trace!("No subscribers for store change: {}", e);
        }
    }
}

fn unavailable(key: &str, err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::read(&conn, key)
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let old_value = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            // A malformed previous value must not block overwriting it.
            let old = Self::read(&conn, key).unwrap_or(None);
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value.to_string()],
            )
            .map_err(|e| unavailable(key, e))?;
            old
        };
        self.publish(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let old_value = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            let old = Self::read(&conn, key).unwrap_or(None);
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(|e| unavailable(key, e))?;
            old
        };
        if old_value.is_some() {
            self.publish(StoreChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
