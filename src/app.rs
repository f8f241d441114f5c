//! Assembles the search engine from configuration and owns its lifecycle.
//!
//! [`Gateway`] wires providers, cache tiers, breakers and metrics into a
//! [`SearchRouter`], runs the periodic jobs (cache warming, cold-tier
//! purge), and on shutdown stops those jobs and drains detached cache
//! writes.

use std::sync::Arc;
use std::time::Duration;

use bookgate_search::http::build_client;
use bookgate_search::{
    author_targets, Background, BookProvider, BreakerRegistry, CacheStore, CacheWarmer, ChannelMetrics, Clock,
    GoogleBooksProvider, IsbndbProvider, MemoryStore, OpenLibraryProvider, SearchContext,
    SearchRouter, SqliteStore, SystemClock, WarmTarget,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::Result;

/// Margin added to the per-call deadline for the HTTP client's own timeout.
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

/// A configured search engine plus its periodic jobs.
pub struct Gateway {
    config: GatewayConfig,
    router: SearchRouter,
    cold: Option<Arc<SqliteStore>>,
    background: Background,
    cancel: CancellationToken,
    jobs: TaskTracker,
}

impl Gateway {
    /// Build the engine with the upstream providers named in `config`.
    ///
    /// Must be called inside a tokio runtime (the metrics aggregator is a
    /// task).
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a provider that cannot
    /// be constructed, or a cold-tier file that cannot be opened.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let providers = upstream_providers(&config)?;
        Self::with_providers(config, providers)
    }

    /// Build the engine with caller-supplied providers.
    ///
    /// # Errors
    ///
    /// As for [`from_config`](Self::from_config).
    pub fn with_providers(
        config: GatewayConfig,
        providers: Vec<Arc<dyn BookProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let cold = match &config.cache.cold_path {
            Some(path) => {
                info!(path = %path.display(), "opening cold cache");
                Some(Arc::new(SqliteStore::open(path, Arc::clone(&clock))?))
            }
            None => None,
        };
        let background = Background::new();
        let breakers = BreakerRegistry::with_policies(
            Arc::clone(&clock),
            config.breakers.paid,
            config.breakers.free,
        );

        let mut builder = SearchRouter::builder()
            .config(config.engine.clone())
            .clock(Arc::clone(&clock))
            .hot_store(Arc::new(MemoryStore::new(config.cache.hot_capacity)))
            .breakers(Arc::new(breakers))
            .metrics(Arc::new(ChannelMetrics::spawn()))
            .background(background.clone());
        if let Some(cold) = &cold {
            builder = builder.cold_store(Arc::clone(cold) as Arc<dyn CacheStore>);
        }
        for provider in providers {
            builder = builder.provider(provider);
        }
        let router = builder.build()?;

        Ok(Self {
            config,
            router,
            cold,
            background,
            cancel: CancellationToken::new(),
            jobs: TaskTracker::new(),
        })
    }

    pub fn router(&self) -> &SearchRouter {
        &self.router
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Cancelled when the gateway shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configured warm targets: cleaned author names, then titles.
    pub fn warm_targets(&self) -> Vec<WarmTarget> {
        let mut targets = author_targets(&self.config.warmer.authors);
        targets.extend(
            self.config
                .warmer
                .titles
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(|t| WarmTarget::new(SearchContext::Title, t)),
        );
        targets
    }

    pub fn warmer(&self) -> CacheWarmer {
        CacheWarmer::new(
            self.router.clone(),
            Duration::from_millis(self.config.warmer.delay_ms),
        )
    }

    /// Start the periodic jobs the configuration enables.
    pub fn start_jobs(&self) {
        if self.config.warmer.enabled {
            let handle = self.warmer().spawn_periodic(
                self.warm_targets(),
                self.config.warmer.top_queries,
                Duration::from_secs(self.config.warmer.interval_secs),
                self.cancel.child_token(),
            );
            self.track(handle);
            info!(
                interval_secs = self.config.warmer.interval_secs,
                "cache warmer scheduled"
            );
        }

        let purge_secs = self.config.cache.purge_interval_secs;
        if let (Some(cold), true) = (&self.cold, purge_secs > 0) {
            let cold = Arc::clone(cold);
            let cancel = self.cancel.child_token();
            self.jobs.spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(purge_secs));
                // The first tick is immediate; skip it so start-up is quiet.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    match cold.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "expired cold entries purged"),
                        Err(e) => tracing::warn!("cold cache purge failed: {e}"),
                    }
                }
            });
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.jobs.spawn(async move {
            if let Err(e) = handle.await {
                tracing::error!("periodic job failed: {e}");
            }
        });
    }

    /// Stop periodic jobs and wait for detached cache writes to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.jobs.close();
        self.jobs.wait().await;
        let pending = self.background.len();
        if pending > 0 {
            info!(pending, "waiting for background cache writes");
        }
        self.background.shutdown().await;
        info!("gateway stopped");
    }
}

/// Construct the upstream adapters `config` enables.
///
/// Open Library is always present. Google Books is present unless disabled;
/// ISBNdb only with an API key.
fn upstream_providers(config: &GatewayConfig) -> Result<Vec<Arc<dyn BookProvider>>> {
    let p = &config.providers;
    let client = build_client(
        p.user_agent.as_deref(),
        config.engine.provider_timeout() + CLIENT_TIMEOUT_MARGIN,
    )?;

    let mut providers: Vec<Arc<dyn BookProvider>> = Vec::new();
    providers.push(Arc::new(match &p.open_library_url {
        Some(url) => OpenLibraryProvider::with_base_url(client.clone(), url)?,
        None => OpenLibraryProvider::new(client.clone())?,
    }));
    if !p.disable_google_books {
        let key = p.google_books_api_key.clone();
        providers.push(Arc::new(match &p.google_books_url {
            Some(url) => GoogleBooksProvider::with_base_url(client.clone(), key, url)?,
            None => GoogleBooksProvider::new(client.clone(), key)?,
        }));
    }
    match p.isbndb_api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            providers.push(Arc::new(match &p.isbndb_url {
                Some(url) => IsbndbProvider::with_base_url(client, key, url)?,
                None => IsbndbProvider::new(client, key)?,
            }));
        }
        _ => info!("no ISBNdb key configured; isbn lookups use the free providers"),
    }
    Ok(providers)
}
