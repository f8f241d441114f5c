//! # bookgate-search
//!
//! Book metadata search behind a two-tier cache.
//!
//! A request names a [`SearchContext`] (author, title, subject or ISBN)
//! and a free-text query. The [`SearchRouter`] normalises the query into a
//! cache key, answers from the hot (in-memory) or cold (SQLite) tier when it
//! can, and otherwise runs the context's provider plan against Open Library,
//! Google Books and ISBNdb.
//!
//! ## Design
//!
//! - Each context has its own plan: ordered providers, sequential or
//!   staggered-parallel execution, a fallback list, a cache TTL and a merge
//!   strategy
//! - Every provider is gated by a circuit breaker; paid providers trip sooner
//! - Provider calls have a hard timeout and never fail the whole request on
//!   their own
//! - Cold-tier entries that are read often are promoted to the hot tier
//! - Cache writes run in the background and are drained on shutdown
//! - A warmer keeps popular queries cached
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), bookgate_search::RouteError> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bookgate_search::{OpenLibraryProvider, SearchContext, SearchOptions, SearchRouter};
//!
//! let client = bookgate_search::http::build_client(None, Duration::from_secs(10))?;
//! let open_library = OpenLibraryProvider::new(client)?;
//! let router = SearchRouter::builder()
//!     .provider(Arc::new(open_library))
//!     .build()?;
//!
//! let page = router
//!     .route(SearchContext::Author, "Stephen King", SearchOptions::default())
//!     .await?;
//! for work in &page.items {
//!     println!("{} ({})", work.title, work.source.as_str());
//! }
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod isbn;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod query;
pub mod types;
pub mod warmer;

pub use background::Background;
pub use cache::{
    CacheEntry, CacheLookup, CacheStore, CachedResult, MemoryStore, SqliteStore, Tier,
    TwoTierCache,
};
pub use circuit_breaker::{Admission, BreakerPolicy, BreakerRegistry, CircuitState, ProviderHealth};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{Result, RouteError, SearchError};
pub use metrics::{
    ChannelMetrics, MetricEvent, MetricsRecorder, MetricsSnapshot, NoopMetrics, PopularQuery,
};
pub use orchestrator::{ExecutionMode, MergeStrategy, SearchPlan, SearchRouter, SearchRouterBuilder};
pub use provider::{BookProvider, ProviderError, ProviderQuery};
pub use providers::{GoogleBooksProvider, IsbndbProvider, OpenLibraryProvider, ScriptedProvider};
pub use query::CacheKey;
pub use types::{
    Author, Edition, Pagination, ProviderAttempt, ProviderId, SearchContext, SearchFailure,
    SearchOptions, SearchResponse, Work,
};
pub use warmer::{author_targets, clean_author_name, CacheWarmer, WarmOutcome, WarmReport, WarmTarget};
