//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] controls per-call timeouts, racing stagger, paging
//! limits, cache promotion, and deduplication. Hosts usually deserialise it
//! from a config file; every field has a default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SearchError;
use crate::query::key::MIN_KEY_MAX_LEN;

/// Tunables for the router, executor, cache and merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-provider call timeout in milliseconds. A call exceeding it is
    /// abandoned and counted as a failure.
    pub provider_timeout_ms: u64,
    /// Start delay between parallel providers (`index × stagger_ms`).
    pub stagger_ms: u64,
    /// Page size when a request does not specify one.
    pub default_max_results: usize,
    /// Largest page size a request may ask for.
    pub max_results_limit: usize,
    /// Items requested from each provider per call.
    pub provider_fetch_limit: usize,
    /// Cumulative reads after which a cold entry moves to the hot tier.
    pub promotion_threshold: u32,
    /// Longest TTL (seconds) a promoted entry keeps in the hot tier.
    pub hot_ttl_cap_secs: u64,
    /// Upper bound on cache key length.
    pub key_max_len: usize,
    /// Longest accepted query, in characters.
    pub max_query_len: usize,
    /// Jaccard similarity at or above which two works are duplicates.
    pub similarity_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 6_000,
            stagger_ms: 100,
            default_max_results: 20,
            max_results_limit: 100,
            provider_fetch_limit: 40,
            promotion_threshold: 3,
            hot_ttl_cap_secs: 3_600,
            key_max_len: crate::query::key::DEFAULT_KEY_MAX_LEN,
            max_query_len: 256,
            similarity_threshold: 0.85,
        }
    }
}

impl EngineConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `provider_timeout_ms`, `default_max_results`, `provider_fetch_limit`,
    ///   `promotion_threshold` and `max_query_len` must be > 0
    /// - `key_max_len` must be at least [`MIN_KEY_MAX_LEN`]
    /// - `default_max_results` must be <= `max_results_limit`
    /// - `similarity_threshold` must lie in `(0, 1]`
    pub fn validate(&self) -> Result<(), SearchError> {
        let positive = [
            ("provider_timeout_ms", self.provider_timeout_ms),
            ("default_max_results", self.default_max_results as u64),
            ("provider_fetch_limit", self.provider_fetch_limit as u64),
            ("promotion_threshold", u64::from(self.promotion_threshold)),
            ("max_query_len", self.max_query_len as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SearchError::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.key_max_len < MIN_KEY_MAX_LEN {
            return Err(SearchError::Config(format!(
                "key_max_len must be at least {MIN_KEY_MAX_LEN}"
            )));
        }
        if self.default_max_results > self.max_results_limit {
            return Err(SearchError::Config(
                "default_max_results must be <= max_results_limit".into(),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(SearchError::Config(
                "similarity_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}
