//! Block list, whitelist and the master switch.
//!
//! Entries are validated and normalized here, at entry, so the engine only
//! ever reads canonical pattern keys from the store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::pattern::SitePattern;
use crate::error::Result;
use crate::store::{keys, load, save, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListEntry {
    pub pattern: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl BlockListEntry {
    pub fn active(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_active: true,
        }
    }
}

/// Editor for the user-owned blocking inputs in the store.
pub struct SiteLists {
    store: Arc<dyn KeyValueStore>,
}

impl SiteLists {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Absent means enabled.
    pub async fn is_enabled(&self) -> Result<bool> {
        Ok(load(self.store.as_ref(), keys::ENABLED)
            .await?
            .unwrap_or(true))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        save(self.store.as_ref(), keys::ENABLED, &enabled).await?;
        tracing::info!(enabled, "Blocking switch changed");
        Ok(())
    }

    pub async fn block_list(&self) -> Result<Vec<BlockListEntry>> {
        Ok(load(self.store.as_ref(), keys::BLOCK_LIST)
            .await?
            .unwrap_or_default())
    }

    pub async fn whitelist(&self) -> Result<Vec<String>> {
        Ok(load(self.store.as_ref(), keys::WHITELIST)
            .await?
            .unwrap_or_default())
    }

    /// Add a site to the block list. Re-adding an existing site re-activates it.
    pub async fn add_blocked(&self, raw: &str) -> Result<BlockListEntry> {
        let key = SitePattern::parse(raw)?.key();
        let mut list = self.block_list().await?;
        let entry = match list.iter_mut().find(|e| e.pattern == key) {
            Some(existing) => {
                existing.is_active = true;
                existing.clone()
            }
            None => {
                let entry = BlockListEntry::active(key);
                list.push(entry.clone());
                entry
            }
        };
        save(self.store.as_ref(), keys::BLOCK_LIST, &list).await?;
        tracing::info!(pattern = %entry.pattern, "Site added to block list");
        Ok(entry)
    }

    /// Returns whether anything was removed.
    pub async fn remove_blocked(&self, raw: &str) -> Result<bool> {
        let key = SitePattern::parse(raw)?.key();
        let mut list = self.block_list().await?;
        let before = list.len();
        list.retain(|e| e.pattern != key);
        if list.len() == before {
            return Ok(false);
        }
        save(self.store.as_ref(), keys::BLOCK_LIST, &list).await?;
        tracing::info!(pattern = %key, "Site removed from block list");
        Ok(true)
    }

    /// Flip `isActive`; `None` when the site is not listed.
    pub async fn toggle_blocked(&self, raw: &str) -> Result<Option<bool>> {
        let key = SitePattern::parse(raw)?.key();
        let mut list = self.block_list().await?;
        let Some(entry) = list.iter_mut().find(|e| e.pattern == key) else {
            return Ok(None);
        };
        entry.is_active = !entry.is_active;
        let active = entry.is_active;
        save(self.store.as_ref(), keys::BLOCK_LIST, &list).await?;
        tracing::info!(pattern = %key, active, "Block list entry toggled");
        Ok(Some(active))
    }

    pub async fn add_whitelisted(&self, raw: &str) -> Result<String> {
        let key = SitePattern::parse(raw)?.key();
        let mut list = self.whitelist().await?;
        if !list.contains(&key) {
            list.push(key.clone());
            save(self.store.as_ref(), keys::WHITELIST, &list).await?;
            tracing::info!(pattern = %key, "Site whitelisted");
        }
        Ok(key)
    }

    pub async fn remove_whitelisted(&self, raw: &str) -> Result<bool> {
        let key = SitePattern::parse(raw)?.key();
        let mut list = self.whitelist().await?;
        let before = list.len();
        list.retain(|p| *p != key);
        if list.len() == before {
            return Ok(false);
        }
        save(self.store.as_ref(), keys::WHITELIST, &list).await?;
        Ok(true)
    }

    /// Write `defaults` as the block list when the key has never been set.
    /// Returns true when seeding happened.
    pub async fn seed_defaults(&self, defaults: &[String]) -> Result<bool> {
        if self.store.get(keys::BLOCK_LIST).await?.is_some() {
            return Ok(false);
        }
        let list: Vec<BlockListEntry> = defaults
            .iter()
            .filter_map(|raw| match SitePattern::parse(raw) {
                Ok(p) => Some(BlockListEntry::active(p.key())),
                Err(e) => {
                    tracing::warn!("Skipping default block list entry: {}", e);
                    None
                }
            })
            .collect();
        save(self.store.as_ref(), keys::BLOCK_LIST, &list).await?;
        tracing::info!(count = list.len(), "Seeded default block list");
        Ok(true)
    }
}
