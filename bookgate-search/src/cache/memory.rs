//! Hot tier: bounded in-process store on [`moka`].

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::store::CacheStore;
use crate::error::Result;

/// Default number of entries held before eviction.
pub const DEFAULT_HOT_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct Stored {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct WrittenTtl;

impl Expiry<String, Stored> for WrittenTtl {
    fn expire_after_create(&self, _key: &String, value: &Stored, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Low-latency, capacity-bounded store. Least-recently-used entries are
/// evicted when full.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, Stored>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(WrittenTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HOT_CAPACITY)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await.map(|s| s.bytes.as_ref().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let stored = Stored {
            bytes: Arc::new(value),
            ttl: Duration::from_secs(ttl_seconds),
        };
        self.cache.insert(key.to_owned(), stored).await;
        Ok(())
    }
}
