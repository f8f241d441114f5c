//! Trait definition for pluggable metadata provider adapters.
//!
//! Each upstream (Open Library, Google Books, ISBNdb) implements
//! [`BookProvider`] and owns its own protocol translation. The engine only
//! depends on this uniform contract.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::types::{ProviderId, SearchContext, Work};

/// Per-call options passed to a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderQuery {
    /// Upper bound on items the provider should return.
    pub max_results: usize,
    /// Extra filters (e.g. `lang`); providers ignore keys they do not know.
    pub params: BTreeMap<String, String>,
}

/// Why a single provider call produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The call exceeded the executor's per-call timeout and was abandoned.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The provider's circuit breaker is open; the call was not attempted.
    #[error("circuit open, call skipped")]
    Unavailable,

    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Reason phrase or response excerpt.
        message: String,
    },

    /// The upstream answered "not found".
    #[error("no results")]
    NoResults,

    /// Connection, TLS or request-building failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("unreadable response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Stable category string reported in `providersChecked`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unavailable => "unavailable",
            Self::Upstream { status: 429, .. } => "rate_limited",
            Self::Upstream { .. } => "upstream",
            Self::NoResults => "no_results",
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
        }
    }

    /// Whether this outcome counts as a failure for the provider's breaker.
    ///
    /// Skips and empty results say nothing about upstream health, and a
    /// client-side 4xx (other than 429) means the upstream is answering.
    pub fn counts_against_breaker(&self) -> bool {
        match self {
            Self::Unavailable | Self::NoResults => false,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) | Self::Transport(_) | Self::Parse(_) => true,
        }
    }
}

/// A metadata provider adapter.
///
/// Implementations must be `Send + Sync` so the executor can fan calls out
/// concurrently. They should not apply their own retries: the executor owns
/// timeouts and the breaker decides when to try again.
#[async_trait]
pub trait BookProvider: Send + Sync {
    /// Which upstream this adapter talks to.
    fn id(&self) -> ProviderId;

    /// Search the upstream for `query` within `context`.
    ///
    /// An empty match list is `Ok(vec![])`. An upstream that signals "not
    /// found" explicitly (a 404 lookup) may return
    /// [`ProviderError::NoResults`]; neither counts against the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the request fails or the response cannot
    /// be decoded.
    async fn search(
        &self,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Result<Vec<Work>, ProviderError>;
}
