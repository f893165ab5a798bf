use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{KeyValueStore, StoreChange};
use crate::error::StoreError;

/// In-process store. Values live for the lifetime of the process.
pub struct MemoryStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
    changes: broadcast::Sender<StoreChange>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            values: Mutex::new(HashMap::new()),
            changes,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate the backing store going away. Every call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self, key: &str) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                key: key.to_string(),
                message: "store is offline".into(),
            });
        }
        Ok(())
    }

    fn publish(&self, change: StoreChange) {
        if let Err(e) = self.changes.send(change) {
            tracing::trace!("No subscribers for store change: {}", e);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.check_online(key)?;
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.check_online(key)?;
        let old_value = {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            values.insert(key.to_string(), value.clone())
        };
        self.publish(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_online(key)?;
        let old_value = {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            values.remove(key)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{load, save};
    use serde_json::json;

    #[tokio::test]
    async fn set_get_and_notify() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.set("enabled", json!(true)).await.unwrap();
        assert_eq!(store.get("enabled").await.unwrap(), Some(json!(true)));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "enabled");
        assert_eq!(change.old_value, None);
        assert_eq!(change.new_value, Some(json!(true)));
    }

    #[tokio::test]
    async fn typed_helpers_roundtrip() {
        let store = MemoryStore::new();
        save(&store, "whitelist", &vec!["docs.rs".to_string()])
            .await
            .unwrap();
        let loaded: Option<Vec<String>> = load(&store, "whitelist").await.unwrap();
        assert_eq!(loaded, Some(vec!["docs.rs".to_string()]));
    }

    #[tokio::test]
    async fn malformed_value_is_reported() {
        let store = MemoryStore::new();
        store.set("enabled", json!("yes")).await.unwrap();
        let result: Result<Option<bool>, _> = load(&store, "enabled").await;
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("session").await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.set("session", json!(null)).await.is_err());
        store.set_offline(false);
        assert!(store.get("session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removing_missing_key_is_silent() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.remove("nothing").await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
