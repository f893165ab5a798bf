//! Persistent key-value store.
//!
//! The core only sees [`KeyValueStore`]: async get/set/remove of JSON values
//! by key plus a broadcast of every change. Two backends ship with the crate:
//! [`MemoryStore`] for tests and simulation, [`SqliteStore`] for the CLI.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::error::{ConfigError, StoreError};

/// Persisted keys shared between the core and its collaborators.
pub mod keys {
    pub const SESSION: &str = "session";
    pub const ENABLED: &str = "enabled";
    pub const BLOCK_LIST: &str = "blockList";
    pub const WHITELIST: &str = "whitelist";
    pub const TEMPORARY_ALLOWANCES: &str = "temporaryAllowances";
    pub const INSTALLED_RULE_IDS: &str = "installedRuleIds";
    pub const STREAK_DATA: &str = "streakData";
    pub const SESSION_STATS: &str = "sessionStats";

    /// Keys whose edits change which sites should be blocked.
    pub const BLOCKING_INPUTS: [&str; 3] = [ENABLED, BLOCK_LIST, WHITELIST];
}

/// A single key changing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Receive a [`StoreChange`] for every subsequent write.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Read and deserialize a key.
pub async fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write a key.
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await
}

/// Returns `~/.config/focusguard[-dev]/` based on FOCUSGUARD_ENV.
///
/// Set FOCUSGUARD_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("FOCUSGUARD_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSGUARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focusguard-dev")
    } else {
        base_dir.join("focusguard")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
