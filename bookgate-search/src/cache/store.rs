//! Key-value store contract shared by both cache tiers.

use async_trait::async_trait;

use crate::error::Result;

/// A byte-oriented store with per-entry TTL.
///
/// Stores are shared by every request and accessed with independent get/put
/// operations; there is no cross-operation locking. Concurrent writers to
/// the same key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the value stored under `key`, if present and not physically
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`](crate::SearchError::Cache) if the
    /// store is unreachable.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value. The store
    /// may discard it after `ttl_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`](crate::SearchError::Cache) if the
    /// write fails.
    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;
}
