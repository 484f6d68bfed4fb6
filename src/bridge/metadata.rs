//! Per-platform metadata reported by the agent.
//!
//! Each `METADATA_MESSAGES_RESPONSE` replaces the entry for its platform. An
//! entry whose `expiresAt` (epoch milliseconds) has passed reads as absent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One payment the agent found in the user's platform session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataItem {
    /// Position of the payment in the agent's list; echoed back in GENERATE_PROOF
    #[serde(default)]
    pub original_index: u32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Platform-specific fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetadataEntry {
    pub metadata: Option<Vec<MetadataItem>>,
    /// Epoch milliseconds after which the entry is stale
    pub expires_at: Option<u64>,
}

impl PlatformMetadataEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(expires_at) if now_ms >= expires_at)
    }

    /// Items the agent did not mark hidden.
    pub fn visible_items(&self) -> Vec<MetadataItem> {
        self.metadata
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|item| !item.hidden)
            .cloned()
            .collect()
    }
}

/// Platform-keyed metadata cache shared between the bridge and its callers.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    entries: Arc<RwLock<HashMap<String, PlatformMetadataEntry>>>,
}

pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `platform`.
    pub fn store(&self, platform: &str, entry: PlatformMetadataEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(platform.to_string(), entry);
    }

    /// The stored entry for `platform`, expired or not.
    pub fn get(&self, platform: &str) -> Option<PlatformMetadataEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform)
            .cloned()
    }

    /// The entry for `platform` if it has not expired at `now_ms`.
    pub fn get_fresh_at(&self, platform: &str, now_ms: u64) -> Option<PlatformMetadataEntry> {
        self.get(platform).filter(|entry| !entry.is_expired(now_ms))
    }

    pub fn get_fresh(&self, platform: &str) -> Option<PlatformMetadataEntry> {
        self.get_fresh_at(platform, now_ms())
    }

    /// Removes only `platform`'s entry. Returns whether one existed.
    pub fn clear(&self, platform: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(platform)
            .is_some()
    }

    pub fn clear_all(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Drops entries expired at `now_ms`; returns how many were dropped.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now_ms));
        before - entries.len()
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        platforms.sort();
        platforms
    }
}
