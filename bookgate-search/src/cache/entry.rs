//! The record stored in either tier.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::Work;

/// Which tier an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Cold,
}

/// The cached value: the full, un-paginated deduplicated result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    pub items: Vec<Work>,
    /// Providers that contributed, as reported in responses.
    pub provider: String,
}

/// A cache record with its logical lifetime.
///
/// Expiry is judged from `created_at_ms + ttl_secs`, not from the store's
/// own eviction, so a physically present but stale row is still a miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachedResult,
    pub created_at_ms: u64,
    pub ttl_secs: u64,
    pub hit_count: u32,
    pub tier: Tier,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: CachedResult, now_ms: u64, ttl_secs: u64, tier: Tier) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at_ms: now_ms,
            ttl_secs,
            hit_count: 0,
            tier,
        }
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms
            .saturating_add(self.ttl_secs.saturating_mul(1000))
    }

    /// True once `now` is strictly past the expiry instant.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms()
    }

    /// Whole seconds of life left, rounded up (zero once expired).
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        self.expires_at_ms().saturating_sub(now_ms).div_ceil(1000)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SearchError::Parse(format!("encode cache entry: {e}")))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SearchError::Parse(format!("decode cache entry: {e}")))
    }
}
