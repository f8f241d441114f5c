//! Per-context routing policy.
//!
//! | Context | Mode | Providers | Fallback | TTL |
//! |---|---|---|---|---|
//! | author | sequential | Open Library | Google Books | 24h |
//! | title | parallel | Google Books, Open Library | none | 6h |
//! | subject | parallel | Open Library, Google Books | none | 12h |
//! | isbn | sequential | ISBNdb | Google Books, Open Library | 7d |
//!
//! List order is priority order: it decides sequential call order, the
//! parallel stagger, and which record survives deduplication.

use crate::types::{ProviderId, SearchContext};

const HOUR: u64 = 3_600;

/// How the primary providers are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One at a time, stopping at the first provider with results.
    Sequential,
    /// All at once (staggered), waiting for every call to settle.
    Parallel,
}

/// How provider results become one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Use the first provider that returned items.
    FirstSuccess,
    /// Deduplicate across every provider that returned items.
    Merge,
    /// [`Merge`](Self::Merge), then move items filed under the queried
    /// subject to the front.
    MergeBySubject,
}

/// The routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub context: SearchContext,
    pub mode: ExecutionMode,
    pub providers: Vec<ProviderId>,
    /// Tried sequentially when the primary round yields no items.
    pub fallback: Vec<ProviderId>,
    pub cache_ttl_secs: u64,
    pub merge: MergeStrategy,
}

impl SearchPlan {
    /// The fixed policy for `context`.
    pub fn for_context(context: SearchContext) -> Self {
        use ProviderId::{GoogleBooks, Isbndb, OpenLibrary};
        let (mode, providers, fallback, cache_ttl_secs, merge) = match context {
            SearchContext::Author => (
                ExecutionMode::Sequential,
                vec![OpenLibrary],
                vec![GoogleBooks],
                24 * HOUR,
                MergeStrategy::FirstSuccess,
            ),
            SearchContext::Title => (
                ExecutionMode::Parallel,
                vec![GoogleBooks, OpenLibrary],
                vec![],
                6 * HOUR,
                MergeStrategy::Merge,
            ),
            SearchContext::Subject => (
                ExecutionMode::Parallel,
                vec![OpenLibrary, GoogleBooks],
                vec![],
                12 * HOUR,
                MergeStrategy::MergeBySubject,
            ),
            SearchContext::Isbn => (
                ExecutionMode::Sequential,
                vec![Isbndb],
                vec![GoogleBooks, OpenLibrary],
                7 * 24 * HOUR,
                MergeStrategy::FirstSuccess,
            ),
        };
        Self {
            context,
            mode,
            providers,
            fallback,
            cache_ttl_secs,
            merge,
        }
    }

    /// Drop providers that are not registered. If that empties the primary
    /// list, the fallback becomes the primary.
    pub fn restricted_to(mut self, available: &[ProviderId]) -> Self {
        self.providers.retain(|p| available.contains(p));
        self.fallback
            .retain(|p| available.contains(p) && !self.providers.contains(p));
        if self.providers.is_empty() {
            self.providers = std::mem::take(&mut self.fallback);
        }
        self
    }

    /// True when no provider can serve this plan.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.fallback.is_empty()
    }

    /// Every provider the plan may call, in priority order.
    pub fn all_providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.providers.iter().chain(self.fallback.iter()).copied()
    }
}
