//! Error types for the bookgate-search crate.
//!
//! Provider failures are not represented here: they are captured per call as
//! [`ProviderError`](crate::provider::ProviderError) values and reported as
//! data. Only malformed requests and total plan failure reach the caller, via
//! [`RouteError`].

use serde::Serialize;

use crate::types::SearchFailure;

/// Errors raised by the engine's own components (not by upstream providers).
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request was malformed (missing query, bad paging values).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A cache store could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),

    /// An HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A stored or upstream payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for bookgate-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

/// The only failures [`SearchRouter::route`](crate::SearchRouter::route) reports.
///
/// Both variants serialise to the error body returned at the response edge.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(untagged)]
pub enum RouteError {
    /// Rejected before touching cache or providers.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable reason.
        message: String,
    },

    /// Every provider in the plan failed or was skipped by its breaker.
    #[error("all providers failed: {}", .0.error)]
    AllProvidersFailed(SearchFailure),

    /// The detached request task panicked or was aborted.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable reason.
        message: String,
    },
}

impl RouteError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<SearchError> for RouteError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidRequest(message) => Self::InvalidRequest { message },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}
