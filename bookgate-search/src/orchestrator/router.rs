//! Top-level entry point: cache → plan → executor → merge → cache write.
//!
//! # Pipeline
//!
//! 1. Classify and normalise the query; reject malformed requests
//! 2. Build the cache key (primary plus transposition variants)
//! 3. Hot tier, then cold tier; a hit returns immediately with `cached`,
//!    its hit-count and promotion writes left to the background
//! 4. On a miss, run the context's provider plan, then its fallback if the
//!    primary round produced nothing
//! 5. Merge per the plan's strategy
//! 6. Write the full, un-paginated set to the cold tier in the background
//! 7. Slice the requested page and record metrics
//!
//! Steps 3–6 run as a tracked background task, so if the caller goes away
//! mid-request the provider calls still finish and populate the cache.

use std::sync::Arc;
use std::time::Instant;

use crate::background::Background;
use crate::cache::{CachedResult, MemoryStore, SqliteStore, Tier, TwoTierCache};
use crate::cache::store::CacheStore;
use crate::circuit_breaker::BreakerRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{RouteError, SearchError};
use crate::metrics::{CacheOutcome, MetricEvent, MetricsRecorder, NoopMetrics};
use crate::provider::{BookProvider, ProviderQuery};
use crate::query::{classify, CacheKey, ClassifiedQuery};
use crate::types::{
    Pagination, ProviderAttempt, ProviderId, SearchContext, SearchFailure, SearchOptions,
    SearchResponse, Work,
};

use super::dedup;
use super::executor::{Executor, ProviderRun};
use super::plan::{ExecutionMode, MergeStrategy, SearchPlan};

/// The full result set before paging.
#[derive(Debug, Clone)]
struct Resolved {
    items: Vec<Work>,
    provider: String,
    cached: bool,
    attempts: Vec<ProviderAttempt>,
}

struct RouterInner {
    config: EngineConfig,
    cache: TwoTierCache,
    executor: Executor,
    available: Vec<ProviderId>,
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
    background: Background,
}

/// Context-aware search router. Cheap to clone.
#[derive(Clone)]
pub struct SearchRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for SearchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRouter")
            .field("providers", &self.inner.available)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl SearchRouter {
    pub fn builder() -> SearchRouterBuilder {
        SearchRouterBuilder::default()
    }

    /// Search `query` within `context`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidRequest`] for an empty or over-long query or
    ///   a page size outside `1..=max_results_limit`
    /// - [`RouteError::AllProvidersFailed`] when no provider in the plan
    ///   produced a response, with each provider's error
    /// - [`RouteError::Internal`] if the request task was aborted
    pub async fn route(
        &self,
        context: SearchContext,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse, RouteError> {
        let classified = classify(query, Some(context), self.inner.config.max_query_len)?;
        self.run(classified, options).await
    }

    /// Search without an explicit context: ISBN-shaped queries go to the
    /// isbn context, everything else to title.
    ///
    /// # Errors
    ///
    /// As for [`route`](Self::route).
    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<SearchResponse, RouteError> {
        let classified = classify(query, None, self.inner.config.max_query_len)?;
        self.run(classified, options).await
    }

    /// Whether a live entry exists for this request, without counting a hit.
    ///
    /// # Errors
    ///
    /// [`SearchError::InvalidRequest`] for a malformed query.
    pub async fn is_cached(
        &self,
        context: SearchContext,
        query: &str,
        options: &SearchOptions,
    ) -> Result<bool, SearchError> {
        let classified = classify(query, Some(context), self.inner.config.max_query_len)?;
        let key = self.inner.key_for(&classified, options);
        Ok(self.inner.cache.contains(&key).await)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.inner.breakers
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.inner.metrics
    }

    pub fn background(&self) -> &Background {
        &self.inner.background
    }

    pub fn cache(&self) -> &TwoTierCache {
        &self.inner.cache
    }

    /// Registered providers.
    pub fn providers(&self) -> &[ProviderId] {
        &self.inner.available
    }

    async fn run(
        &self,
        classified: ClassifiedQuery,
        options: SearchOptions,
    ) -> Result<SearchResponse, RouteError> {
        let started = Instant::now();
        let config = &self.inner.config;
        let max_results = match options.max_results {
            0 => config.default_max_results,
            n if n > config.max_results_limit => {
                return Err(RouteError::invalid(format!(
                    "maxResults must be between 1 and {}",
                    config.max_results_limit
                )));
            }
            n => n,
        };
        let context = classified.context;
        let query_label = classified.provider_query.clone();
        let page = options.page;

        let inner = Arc::clone(&self.inner);
        let task = self
            .inner
            .background
            .spawn(async move { inner.resolve(classified, options).await });
        let resolved = match task.await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(%context, "request task failed: {e}");
                return Err(RouteError::Internal {
                    message: format!("request task failed: {e}"),
                });
            }
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = match resolved {
            Ok(resolved) => {
                let total_items = resolved.items.len();
                let items: Vec<Work> = resolved
                    .items
                    .into_iter()
                    .skip(page.saturating_mul(max_results))
                    .take(max_results)
                    .collect();
                Ok(SearchResponse {
                    items,
                    total_items,
                    cached: resolved.cached,
                    provider: resolved.provider,
                    response_time: latency_ms,
                    pagination: Pagination {
                        page,
                        max_results,
                        total_pages: total_items.div_ceil(max_results),
                    },
                    providers_checked: resolved.attempts,
                })
            }
            Err(failure) => Err(RouteError::AllProvidersFailed(failure)),
        };

        self.inner.metrics.record(MetricEvent::Request {
            context,
            query: query_label,
            latency_ms,
            cached: outcome.as_ref().is_ok_and(|r| r.cached),
            success: outcome.is_ok(),
        });
        tracing::debug!(%context, latency_ms, ok = outcome.is_ok(), "request served");
        outcome
    }
}

impl RouterInner {
    fn key_for(&self, classified: &ClassifiedQuery, options: &SearchOptions) -> CacheKey {
        CacheKey::new(
            classified.context,
            &classified.normalized,
            &options.params,
            self.config.key_max_len,
        )
    }

    /// Cache lookup, then providers. Returns the full result set.
    async fn resolve(
        self: Arc<Self>,
        classified: ClassifiedQuery,
        options: SearchOptions,
    ) -> Result<Resolved, SearchFailure> {
        let context = classified.context;
        let key = self.key_for(&classified, &options);

        if options.force_refresh {
            self.record_cache(context, CacheOutcome::Bypass);
        } else if let Some(hit) = self.cache.lookup(&key).await {
            let outcome = match (hit.via_variant, hit.tier) {
                (true, _) => CacheOutcome::VariantHit,
                (false, Tier::Hot) => CacheOutcome::HotHit,
                (false, Tier::Cold) => CacheOutcome::ColdHit,
            };
            self.record_cache(context, outcome);
            tracing::debug!(%context, key = key.primary(), ?outcome, hits = hit.entry.hit_count, "cache hit");
            return Ok(Resolved {
                items: hit.entry.payload.items,
                provider: hit.entry.payload.provider,
                cached: true,
                attempts: Vec::new(),
            });
        } else {
            self.record_cache(context, CacheOutcome::Miss);
        }

        let plan = SearchPlan::for_context(context).restricted_to(&self.available);
        let provider_query = ProviderQuery {
            max_results: self.config.provider_fetch_limit,
            params: options.params.clone(),
        };
        let query = classified.provider_query.as_str();

        let mut runs = self
            .executor
            .run(&plan.providers, plan.mode, query, context, &provider_query)
            .await;
        if !runs.iter().any(ProviderRun::has_items) && !plan.fallback.is_empty() {
            tracing::debug!(%context, "primary providers empty, trying fallback");
            let fallback = self
                .executor
                .run(&plan.fallback, ExecutionMode::Sequential, query, context, &provider_query)
                .await;
            runs.extend(fallback);
        }

        let attempts: Vec<ProviderAttempt> = runs.iter().map(ProviderRun::attempt).collect();
        if !runs.iter().any(ProviderRun::answered) {
            let failure = SearchFailure {
                items: Vec::new(),
                error: if attempts.is_empty() {
                    "no provider is configured for this context".into()
                } else {
                    "all providers failed".into()
                },
                context,
                query: classified.provider_query.clone(),
                providers_checked: attempts,
            };
            tracing::warn!(%context, query, providers = failure.providers_checked.len(), "all providers failed");
            return Err(failure);
        }

        let contributing: Vec<ProviderId> = runs.iter().filter(|r| r.has_items()).map(|r| r.provider).collect();
        let batches: Vec<Vec<Work>> = runs
            .into_iter()
            .filter_map(|r| r.outcome.ok())
            .filter(|items| !items.is_empty())
            .collect();
        let items = match plan.merge {
            MergeStrategy::FirstSuccess => {
                let first = batches.into_iter().next().unwrap_or_default();
                dedup::drop_exact_duplicates(dedup::filter_noise(first))
            }
            MergeStrategy::Merge => dedup::merge(batches, self.config.similarity_threshold),
            MergeStrategy::MergeBySubject => {
                let mut items = dedup::merge(batches, self.config.similarity_threshold);
                dedup::reorder_by_subject(&mut items, query);
                items
            }
        };
        let provider = contributing
            .iter()
            .map(ProviderId::as_str)
            .collect::<Vec<_>>()
            .join("+");

        if items.is_empty() {
            tracing::debug!(%context, query, "no items, not caching");
        } else {
            let cache = self.cache.clone();
            let primary = key.primary().to_owned();
            let payload = CachedResult {
                items: items.clone(),
                provider: provider.clone(),
            };
            let ttl = plan.cache_ttl_secs;
            self.background.spawn(async move {
                cache.put(&primary, payload, ttl).await;
                tracing::trace!(key = %primary, ttl, "result cached");
            });
        }

        Ok(Resolved {
            items,
            provider,
            cached: false,
            attempts,
        })
    }

    fn record_cache(&self, context: SearchContext, outcome: CacheOutcome) {
        self.metrics.record(MetricEvent::Cache { context, outcome });
    }
}

/// Builder for [`SearchRouter`].
///
/// Only providers are required. Defaults: in-memory hot tier, in-memory
/// SQLite cold tier, system clock, per-provider default breaker policies,
/// no metrics.
#[derive(Default)]
pub struct SearchRouterBuilder {
    config: EngineConfig,
    providers: Vec<Arc<dyn BookProvider>>,
    hot: Option<Arc<dyn CacheStore>>,
    cold: Option<Arc<dyn CacheStore>>,
    clock: Option<Arc<dyn Clock>>,
    breakers: Option<Arc<BreakerRegistry>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    background: Option<Background>,
}

impl SearchRouterBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider. A later provider with the same id replaces an
    /// earlier one.
    pub fn provider(mut self, provider: Arc<dyn BookProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn hot_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.hot = Some(store);
        self
    }

    pub fn cold_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cold = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Share a task tracker with the host so shutdown can drain it.
    pub fn background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    /// # Errors
    ///
    /// [`SearchError::Config`] for an invalid [`EngineConfig`] or no
    /// providers; [`SearchError::Cache`] if the default cold store cannot
    /// be created.
    pub fn build(self) -> Result<SearchRouter, SearchError> {
        self.config.validate()?;
        if self.providers.is_empty() {
            return Err(SearchError::Config("at least one provider must be registered".into()));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let hot = self
            .hot
            .unwrap_or_else(|| Arc::new(MemoryStore::default()));
        let cold = match self.cold {
            Some(cold) => cold,
            None => Arc::new(SqliteStore::open_in_memory(Arc::clone(&clock))?),
        };
        let background = self.background.unwrap_or_default();
        let cache = TwoTierCache::new(hot, cold, Arc::clone(&clock))
            .with_promotion(self.config.promotion_threshold, self.config.hot_ttl_cap_secs)
            .with_background(background.clone());
        let breakers = self
            .breakers
            .unwrap_or_else(|| Arc::new(BreakerRegistry::new(Arc::clone(&clock))));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let executor = Executor::new(
            self.providers,
            Arc::clone(&breakers),
            Arc::clone(&metrics),
            self.config.provider_timeout(),
            self.config.stagger(),
        );
        let available = executor.available();
        tracing::info!(providers = ?available, "search router ready");

        Ok(SearchRouter {
            inner: Arc::new(RouterInner {
                config: self.config,
                cache,
                executor,
                available,
                breakers,
                metrics,
                background,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::clock::ManualClock;
    use crate::metrics::ChannelMetrics;
    use crate::provider::ProviderError;
    use crate::providers::ScriptedProvider;
    use crate::types::Author;

    struct Harness {
        router: SearchRouter,
        clock: Arc<ManualClock>,
        ol: Arc<ScriptedProvider>,
        gb: Arc<ScriptedProvider>,
    }

    fn harness(ol: ScriptedProvider, gb: ScriptedProvider) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let ol = Arc::new(ol);
        let gb = Arc::new(gb);
        let config = EngineConfig {
            stagger_ms: 0,
            ..Default::default()
        };
        let router = SearchRouter::builder()
            .config(config)
            .clock(clock.clone())
            .provider(ol.clone())
            .provider(gb.clone())
            .build()
            .expect("router");
        Harness { router, clock, ol, gb }
    }

    fn options(max_results: usize, page: usize) -> SearchOptions {
        SearchOptions {
            max_results,
            page,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn miss_then_hit_skips_providers() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary)
                .returning(ScriptedProvider::works(ProviderId::OpenLibrary, "Stephen King", 30)),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        let first = h
            .router
            .route(SearchContext::Author, "Stephen King", options(40, 0))
            .await
            .expect("first");
        assert!(!first.cached);
        assert_eq!(first.total_items, 30);
        assert_eq!(first.provider, "open_library");
        h.router.background().settle().await;

        let second = h
            .router
            .route(SearchContext::Author, "stephen  king", options(40, 0))
            .await
            .expect("second");
        assert!(second.cached);
        assert_eq!(second.items.len(), 30);
        assert_eq!(h.ol.calls(), 1);
        assert_eq!(h.gb.calls(), 0);
    }

    #[tokio::test]
    async fn author_falls_back_when_primary_is_empty() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary),
            ScriptedProvider::new(ProviderId::GoogleBooks)
                .returning(ScriptedProvider::works(ProviderId::GoogleBooks, "Andy Weir", 3)),
        );
        let response = h
            .router
            .route(SearchContext::Author, "Andy Weir", options(10, 0))
            .await
            .expect("fallback result");
        assert_eq!(response.total_items, 3);
        assert_eq!(response.provider, "google_books");
        assert_eq!(response.providers_checked.len(), 2);
    }

    #[tokio::test]
    async fn title_merges_both_providers() {
        let mut gb_dune = Work::new("Dune", vec![Author::named("Frank Herbert")], ProviderId::GoogleBooks);
        gb_dune.external_ids.insert("google_books".into(), "B1".into());
        let mut ol_dune = Work::new("Dune", vec![Author::named("Frank Herbert")], ProviderId::OpenLibrary);
        ol_dune.external_ids.insert("open_library".into(), "OL1W".into());
        let ol_messiah = Work::new("Dune Messiah", vec![Author::named("Frank Herbert")], ProviderId::OpenLibrary);

        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary).returning(vec![ol_dune, ol_messiah]),
            ScriptedProvider::new(ProviderId::GoogleBooks).returning(vec![gb_dune]),
        );
        let response = h
            .router
            .route(SearchContext::Title, "Dune", options(10, 0))
            .await
            .expect("merged");
        assert_eq!(response.total_items, 2);
        assert_eq!(response.provider, "google_books+open_library");
        assert_eq!(response.items[0].source, ProviderId::GoogleBooks);
        assert_eq!(response.items[0].external_ids.len(), 2);
    }

    #[tokio::test]
    async fn all_failed_reports_each_provider() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary).failing(ProviderError::Upstream {
                status: 500,
                message: "Internal Server Error".into(),
            }),
            ScriptedProvider::new(ProviderId::GoogleBooks).failing(ProviderError::Upstream {
                status: 429,
                message: "Too Many Requests".into(),
            }),
        );
        let err = h
            .router
            .route(SearchContext::Title, "Dune", options(10, 0))
            .await
            .unwrap_err();
        let RouteError::AllProvidersFailed(failure) = err else {
            panic!("expected AllProvidersFailed, got {err:?}");
        };
        assert!(failure.items.is_empty());
        assert_eq!(failure.providers_checked.len(), 2);
        let kinds: Vec<_> = failure
            .providers_checked
            .iter()
            .map(|a| a.error_kind.clone().unwrap_or_default())
            .collect();
        assert!(kinds.contains(&"rate_limited".to_string()));
        assert!(kinds.contains(&"upstream".to_string()));
        assert!(!failure.all_unavailable());
    }

    #[tokio::test]
    async fn empty_results_are_success_but_not_cached() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        let response = h
            .router
            .route(SearchContext::Subject, "zzzz", options(10, 0))
            .await
            .expect("empty success");
        assert_eq!(response.total_items, 0);
        assert_eq!(response.pagination.total_pages, 0);
        h.router.background().settle().await;
        assert!(!h
            .router
            .is_cached(SearchContext::Subject, "zzzz", &SearchOptions::default())
            .await
            .expect("valid"));
    }

    #[tokio::test]
    async fn invalid_requests_touch_nothing() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        let empty = h.router.route(SearchContext::Author, "   ", options(10, 0)).await;
        assert!(matches!(empty, Err(RouteError::InvalidRequest { .. })));
        let too_many = h.router.route(SearchContext::Author, "Le Guin", options(1_000, 0)).await;
        assert!(matches!(too_many, Err(RouteError::InvalidRequest { .. })));
        assert_eq!(h.ol.calls() + h.gb.calls(), 0);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_read_but_writes() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary)
                .returning(ScriptedProvider::works(ProviderId::OpenLibrary, "Octavia Butler", 4)),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        h.router
            .route(SearchContext::Author, "Octavia Butler", options(10, 0))
            .await
            .expect("first");
        h.router.background().settle().await;
        let forced = h
            .router
            .route(
                SearchContext::Author,
                "Octavia Butler",
                SearchOptions {
                    force_refresh: true,
                    ..options(10, 0)
                },
            )
            .await
            .expect("forced");
        assert!(!forced.cached);
        assert_eq!(h.ol.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entry_goes_back_to_providers() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary)
                .returning(ScriptedProvider::works(ProviderId::OpenLibrary, "N. K. Jemisin", 2)),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        h.router
            .route(SearchContext::Author, "N. K. Jemisin", options(10, 0))
            .await
            .expect("first");
        h.router.background().settle().await;
        h.clock.advance(std::time::Duration::from_secs(24 * 3_600 + 1));
        let again = h
            .router
            .route(SearchContext::Author, "N. K. Jemisin", options(10, 0))
            .await
            .expect("second");
        assert!(!again.cached);
        assert_eq!(h.ol.calls(), 2);
    }

    #[tokio::test]
    async fn transposed_author_hits_variant() {
        let metrics = Arc::new(ChannelMetrics::spawn());
        let ol = Arc::new(
            ScriptedProvider::new(ProviderId::OpenLibrary)
                .returning(ScriptedProvider::works(ProviderId::OpenLibrary, "Andy Weir", 3)),
        );
        let router = SearchRouter::builder()
            .provider(ol.clone())
            .metrics(metrics.clone())
            .build()
            .expect("router");
        router
            .route(SearchContext::Author, "Andy Weir", options(10, 0))
            .await
            .expect("first");
        router.background().settle().await;

        let swapped = router
            .route(SearchContext::Author, "Weir, Andy", options(10, 0))
            .await
            .expect("variant");
        assert!(swapped.cached);
        assert_eq!(ol.calls(), 1);
        assert_eq!(metrics.snapshot().await.cache.variant_hits, 1);
    }

    #[tokio::test]
    async fn open_breaker_is_skipped_and_reported_unavailable() {
        let gb = ScriptedProvider::new(ProviderId::GoogleBooks).failing(ProviderError::Timeout(6000));
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary)
                .failing(ProviderError::Transport("connection reset".into())),
            gb,
        );
        for _ in 0..5 {
            let _ = h.router.route(SearchContext::Title, "Dune", options(10, 0)).await;
        }
        assert_eq!(h.router.breakers().state(ProviderId::GoogleBooks), CircuitState::Open);
        assert_eq!(h.router.breakers().state(ProviderId::OpenLibrary), CircuitState::Open);

        let err = h
            .router
            .route(SearchContext::Title, "Dune", options(10, 0))
            .await
            .unwrap_err();
        let RouteError::AllProvidersFailed(failure) = err else {
            panic!("expected AllProvidersFailed");
        };
        assert!(failure.all_unavailable());
        assert_eq!(h.gb.calls(), 3);
        assert_eq!(h.ol.calls(), 5);
    }

    #[tokio::test]
    async fn single_source_duplicates_are_collapsed() {
        let carrie = || Work::new("Carrie", vec![Author::named("Stephen King")], ProviderId::OpenLibrary);
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary).returning(vec![carrie(), carrie()]),
            ScriptedProvider::new(ProviderId::GoogleBooks),
        );
        let response = h
            .router
            .route(SearchContext::Author, "Stephen King", options(10, 0))
            .await
            .expect("author search");
        assert_eq!(response.total_items, 1);
        assert_eq!(response.items[0].title, "Carrie");
    }

    #[tokio::test]
    async fn not_found_everywhere_is_an_empty_success() {
        let h = harness(
            ScriptedProvider::new(ProviderId::OpenLibrary).failing(ProviderError::NoResults),
            ScriptedProvider::new(ProviderId::GoogleBooks).failing(ProviderError::NoResults),
        );
        let response = h
            .router
            .route(SearchContext::Author, "Nobody Atall", options(10, 0))
            .await
            .expect("no results is not a failure");
        assert_eq!(response.total_items, 0);
        let kinds: Vec<_> = response
            .providers_checked
            .iter()
            .map(|a| a.error_kind.as_deref())
            .collect();
        assert_eq!(kinds, vec![Some("no_results"), Some("no_results")]);
        assert_eq!(h.router.breakers().state(ProviderId::OpenLibrary), CircuitState::Closed);
    }

    #[tokio::test]
    async fn search_infers_isbn_context() {
        let gb = ScriptedProvider::new(ProviderId::GoogleBooks).returning(vec![Work::new(
            "Dune",
            vec![Author::named("Frank Herbert")],
            ProviderId::GoogleBooks,
        )]);
        let h = harness(ScriptedProvider::new(ProviderId::OpenLibrary), gb);
        let response = h
            .router
            .search("0-441-17271-7", SearchOptions::default())
            .await
            .expect("isbn search");
        assert_eq!(response.total_items, 1);
        // No ISBNdb registered, so Google Books is the primary.
        assert_eq!(h.gb.queries(), vec!["0441172717"]);
        assert_eq!(h.ol.calls(), 0);
    }

    #[test]
    fn builder_requires_a_provider() {
        let err = SearchRouter::builder().build().unwrap_err();
        assert!(err.to_string().contains("provider"));
    }
}
