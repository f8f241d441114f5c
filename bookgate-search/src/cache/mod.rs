//! Two-tier result cache.
//!
//! New results land in the cold tier. Every read bumps the entry's hit
//! count; once it reaches the promotion threshold the entry is copied into
//! the hot tier, where later reads find it first. Entries are never demoted;
//! hot copies simply expire.
//!
//! Bookkeeping writes on a hit (the new count, promotion, variant
//! write-through) run on the [`Background`] tracker; a hit returns as soon
//! as the entry is read.
//!
//! Store failures are logged and treated as misses so a broken cache
//! degrades to "always call providers" rather than failing requests.

pub mod entry;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use entry::{CacheEntry, CachedResult, Tier};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::CacheStore;

use std::sync::Arc;

use crate::background::Background;
use crate::clock::Clock;
use crate::query::CacheKey;

/// Default cumulative reads before promotion.
pub const DEFAULT_PROMOTION_THRESHOLD: u32 = 3;

/// Default cap on a promoted entry's hot-tier lifetime.
pub const DEFAULT_HOT_TTL_CAP_SECS: u64 = 3_600;

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// The entry after this read was counted.
    pub entry: CacheEntry,
    /// Tier the entry was read from.
    pub tier: Tier,
    /// Whether the hit came from a transposition variant rather than the
    /// primary key.
    pub via_variant: bool,
}

/// Hot store in front of a cold store, with promotion and lazy expiry.
#[derive(Clone)]
pub struct TwoTierCache {
    hot: Arc<dyn CacheStore>,
    cold: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    promotion_threshold: u32,
    hot_ttl_cap_secs: u64,
    background: Background,
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("hot", &self.hot.name())
            .field("cold", &self.cold.name())
            .field("promotion_threshold", &self.promotion_threshold)
            .field("hot_ttl_cap_secs", &self.hot_ttl_cap_secs)
            .finish()
    }
}

impl TwoTierCache {
    pub fn new(hot: Arc<dyn CacheStore>, cold: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hot,
            cold,
            clock,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            hot_ttl_cap_secs: DEFAULT_HOT_TTL_CAP_SECS,
            background: Background::new(),
        }
    }

    /// Run hit bookkeeping on a shared tracker.
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    /// Tracker holding pending bookkeeping writes.
    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Override the promotion threshold and the hot-tier TTL cap.
    pub fn with_promotion(mut self, threshold: u32, hot_ttl_cap_secs: u64) -> Self {
        self.promotion_threshold = threshold.max(1);
        self.hot_ttl_cap_secs = hot_ttl_cap_secs;
        self
    }

    fn store(&self, tier: Tier) -> &dyn CacheStore {
        match tier {
            Tier::Hot => self.hot.as_ref(),
            Tier::Cold => self.cold.as_ref(),
        }
    }

    /// Read one tier, treating errors, corrupt rows and logically expired
    /// entries as absent.
    async fn read_tier(&self, tier: Tier, key: &str, now: u64) -> Option<CacheEntry> {
        let store = self.store(tier);
        let bytes = match store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(store = store.name(), key, "cache read failed, treating as miss: {e}");
                return None;
            }
        };
        match CacheEntry::from_bytes(&bytes) {
            Ok(entry) if entry.is_expired(now) => {
                tracing::trace!(store = store.name(), key, "entry expired");
                None
            }
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(store = store.name(), key, "corrupt cache entry ignored: {e}");
                None
            }
        }
    }

    async fn write_tier(&self, tier: Tier, entry: &CacheEntry, ttl_secs: u64) {
        let store = self.store(tier);
        let bytes = match entry.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %entry.key, "cache entry not encodable: {e}");
                return;
            }
        };
        if let Err(e) = store.put(&entry.key, bytes, ttl_secs).await {
            tracing::warn!(store = store.name(), key = %entry.key, "cache write failed: {e}");
        }
    }

    /// Queue a write without waiting for it.
    fn write_behind(&self, tier: Tier, entry: CacheEntry, ttl_secs: u64) {
        let cache = self.clone();
        self.background.spawn(async move {
            cache.write_tier(tier, &entry, ttl_secs).await;
        });
    }

    /// Hot first, then cold, without counting the read.
    async fn find(&self, key: &str, now: u64) -> Option<(CacheEntry, Tier)> {
        if let Some(entry) = self.read_tier(Tier::Hot, key, now).await {
            return Some((entry, Tier::Hot));
        }
        self.read_tier(Tier::Cold, key, now)
            .await
            .map(|entry| (entry, Tier::Cold))
    }

    /// Look up `key`, counting the read and promoting when due.
    ///
    /// Returns the entry with its updated hit count and the tier it was
    /// found in. The count and any promotion are persisted in the
    /// background.
    pub async fn get(&self, key: &str) -> Option<(CacheEntry, Tier)> {
        let now = self.clock.now_millis();
        let (mut entry, tier) = self.find(key, now).await?;
        entry.hit_count = entry.hit_count.saturating_add(1);
        let remaining = entry.remaining_secs(now).max(1);

        match tier {
            Tier::Hot => self.write_behind(Tier::Hot, entry.clone(), remaining),
            Tier::Cold => {
                // The cold copy keeps the running count so an evicted hot
                // copy is re-promoted on its next read.
                self.write_behind(Tier::Cold, entry.clone(), remaining);
                if entry.hit_count >= self.promotion_threshold {
                    let hot_ttl = remaining.min(self.hot_ttl_cap_secs).max(1);
                    let mut promoted = entry.clone();
                    promoted.tier = Tier::Hot;
                    promoted.created_at_ms = now;
                    promoted.ttl_secs = hot_ttl;
                    self.write_behind(Tier::Hot, promoted, hot_ttl);
                    tracing::debug!(key, hits = entry.hit_count, hot_ttl, "entry promoted to hot tier");
                }
            }
        }
        Some((entry, tier))
    }

    /// Look up a request key: primary first, then each variant.
    ///
    /// A variant hit is written through to the primary key (cold tier, in
    /// the background) so the next identical request hits directly.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheLookup> {
        if let Some((entry, tier)) = self.get(key.primary()).await {
            return Some(CacheLookup {
                entry,
                tier,
                via_variant: false,
            });
        }
        for variant in key.variants() {
            let Some((entry, tier)) = self.get(variant).await else {
                continue;
            };
            let now = self.clock.now_millis();
            let remaining = entry.remaining_secs(now).max(1);
            let copy = CacheEntry::new(
                key.primary(),
                entry.payload.clone(),
                now,
                remaining,
                Tier::Cold,
            );
            self.write_behind(Tier::Cold, copy, remaining);
            tracing::debug!(primary = key.primary(), variant = %variant, "variant hit written through");
            return Some(CacheLookup {
                entry,
                tier,
                via_variant: true,
            });
        }
        None
    }

    /// Store a fresh result under `key` in the cold tier.
    pub async fn put(&self, key: &str, payload: CachedResult, ttl_secs: u64) {
        let entry = CacheEntry::new(key, payload, self.clock.now_millis(), ttl_secs, Tier::Cold);
        self.write_tier(Tier::Cold, &entry, ttl_secs).await;
    }

    /// Read `key` without counting the read or promoting.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now_millis();
        self.find(key, now).await.map(|(entry, _)| entry)
    }

    /// Whether the primary key or any variant currently holds a live entry.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        if self.peek(key.primary()).await.is_some() {
            return true;
        }
        for variant in key.variants() {
            if self.peek(variant).await.is_some() {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{Result, SearchError};
    use crate::types::{Author, ProviderId, SearchContext, Work};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Wraps a store and makes every write slow.
    struct SlowWrites {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl CacheStore for SlowWrites {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(key, value, ttl_seconds).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(SearchError::Cache("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl_seconds: u64) -> Result<()> {
            Err(SearchError::Cache("connection refused".into()))
        }
    }

    fn payload() -> CachedResult {
        CachedResult {
            items: vec![Work::new(
                "The Martian",
                vec![Author::named("Andy Weir")],
                ProviderId::OpenLibrary,
            )],
            provider: "open_library".into(),
        }
    }

    fn cache() -> (Arc<ManualClock>, TwoTierCache) {
        let clock = Arc::new(ManualClock::default());
        let cold = SqliteStore::open_in_memory(clock.clone()).expect("open");
        let cache = TwoTierCache::new(Arc::new(MemoryStore::default()), Arc::new(cold), clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn round_trip_counts_the_read() {
        let (_, cache) = cache();
        cache.put("author:k", payload(), 86_400).await;
        let (entry, tier) = cache.get("author:k").await.expect("hit");
        assert_eq!(entry.payload, payload());
        assert_eq!(entry.hit_count, 1);
        assert_eq!(tier, Tier::Cold);
    }

    #[tokio::test]
    async fn promotion_after_threshold_cold_hits() {
        let (_, cache) = cache();
        cache.put("author:k", payload(), 86_400).await;
        for expected in 1..=3 {
            let (entry, tier) = cache.get("author:k").await.expect("hit");
            assert_eq!(tier, Tier::Cold);
            assert_eq!(entry.hit_count, expected);
            cache.background().settle().await;
        }
        let (entry, tier) = cache.get("author:k").await.expect("hit");
        assert_eq!(tier, Tier::Hot);
        assert_eq!(entry.hit_count, 4);
    }

    #[tokio::test]
    async fn promoted_ttl_is_capped() {
        let (clock, cache) = cache();
        let cache = cache.with_promotion(1, 60);
        cache.put("subject:k", payload(), 43_200).await;
        cache.get("subject:k").await.expect("promoting read");
        cache.background().settle().await;

        // Hot copy is gone after its capped TTL; the cold copy still serves.
        clock.advance(Duration::from_secs(61));
        let (_, tier) = cache.get("subject:k").await.expect("hit");
        assert_eq!(tier, Tier::Cold);
    }

    #[tokio::test]
    async fn entry_is_absent_after_ttl() {
        let (clock, cache) = cache();
        cache.put("title:k", payload(), 1).await;
        clock.advance(Duration::from_secs(2));
        assert!(cache.get("title:k").await.is_none());
    }

    #[tokio::test]
    async fn variant_hit_writes_through_to_primary() {
        let (_, cache) = cache();
        let params = BTreeMap::new();
        let written = CacheKey::new(SearchContext::Author, "andy weir", &params, 200);
        let requested = CacheKey::new(SearchContext::Author, "weir andy", &params, 200);
        cache.put(written.primary(), payload(), 86_400).await;

        let hit = cache.lookup(&requested).await.expect("variant hit");
        assert!(hit.via_variant);
        cache.background().settle().await;

        let direct = cache.peek(requested.primary()).await.expect("written through");
        assert_eq!(direct.payload, payload());
        assert_eq!(direct.hit_count, 0);
    }

    #[tokio::test]
    async fn peek_does_not_count() {
        let (_, cache) = cache();
        cache.put("isbn:k", payload(), 600).await;
        cache.peek("isbn:k").await.expect("present");
        let (entry, _) = cache.get("isbn:k").await.expect("hit");
        assert_eq!(entry.hit_count, 1);
    }

    #[tokio::test]
    async fn contains_checks_variants() {
        let (_, cache) = cache();
        let params = BTreeMap::new();
        let written = CacheKey::new(SearchContext::Author, "stephen king", &params, 200);
        let swapped = CacheKey::new(SearchContext::Author, "king stephen", &params, 200);
        assert!(!cache.contains(&swapped).await);
        cache.put(written.primary(), payload(), 600).await;
        assert!(cache.contains(&swapped).await);
    }

    #[tokio::test]
    async fn broken_stores_degrade_to_miss() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let cache = TwoTierCache::new(Arc::new(BrokenStore), Arc::new(BrokenStore), clock);
        cache.put("author:k", payload(), 600).await;
        assert!(cache.get("author:k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hit_does_not_wait_for_bookkeeping_writes() {
        let clock = Arc::new(ManualClock::default());
        let cold = Arc::new(SlowWrites {
            inner: MemoryStore::default(),
            delay: Duration::from_secs(5),
        });
        let entry = CacheEntry::new("author:k", payload(), clock.now_millis(), 86_400, Tier::Cold);
        cold.inner
            .put("author:k", entry.to_bytes().expect("encode"), 86_400)
            .await
            .expect("seed");
        let cache = TwoTierCache::new(Arc::new(MemoryStore::default()), cold, clock)
            .with_promotion(1, 3_600);

        let (entry, tier) = tokio::time::timeout(Duration::from_millis(100), cache.get("author:k"))
            .await
            .expect("hit returned before the slow write finished")
            .expect("hit");
        assert_eq!(tier, Tier::Cold);
        assert_eq!(entry.hit_count, 1);
        assert!(!cache.background().is_empty());

        cache.background().settle().await;
        assert_eq!(cache.peek("author:k").await.expect("present").hit_count, 1);
        let (_, tier) = cache.get("author:k").await.expect("hit");
        assert_eq!(tier, Tier::Hot);
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let (_, cache) = cache();
        cache
            .cold
            .put("author:k", b"{not json".to_vec(), 600)
            .await
            .expect("raw put");
        assert!(cache.get("author:k").await.is_none());
    }
}
