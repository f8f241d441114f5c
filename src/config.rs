//! Gateway configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so an
//! empty file (or no file) yields a working local setup with Open Library
//! only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bookgate_search::{BreakerPolicy, EngineConfig};

use crate::error::{GatewayError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub providers: ProvidersConfig,
    pub breakers: BreakersConfig,
    pub warmer: WarmerConfig,
    /// Router, executor and merge tunables.
    pub engine: EngineConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

/// Hot and cold cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held in memory.
    pub hot_capacity: u64,
    /// SQLite file for the cold tier. `None` keeps the cold tier in memory.
    pub cold_path: Option<PathBuf>,
    /// Purge expired cold rows this often (0 disables the sweep).
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: bookgate_search::cache::memory::DEFAULT_HOT_CAPACITY,
            cold_path: default_cold_path(),
            purge_interval_secs: 3_600,
        }
    }
}

fn default_cold_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("bookgate").join("cache.sqlite3"))
}

/// Upstream credentials and endpoint overrides.
///
/// Google Books works without a key at a lower quota. ISBNdb is only
/// registered when a key is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google_books_api_key: Option<String>,
    pub isbndb_api_key: Option<String>,
    pub open_library_url: Option<String>,
    pub google_books_url: Option<String>,
    pub isbndb_url: Option<String>,
    /// Disable Google Books entirely.
    pub disable_google_books: bool,
    /// Custom User-Agent for upstream requests.
    pub user_agent: Option<String>,
}

/// Breaker policies by provider class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakersConfig {
    /// Metered providers (Google Books, ISBNdb).
    pub paid: BreakerPolicy,
    /// Free providers (Open Library).
    pub free: BreakerPolicy,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            paid: BreakerPolicy::paid(),
            free: BreakerPolicy::free(),
        }
    }
}

/// Background cache warming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmerConfig {
    pub enabled: bool,
    /// Seconds between warm runs.
    pub interval_secs: u64,
    /// Pause between upstream fetches within a run.
    pub delay_ms: u64,
    /// Author names to keep warm.
    pub authors: Vec<String>,
    /// Title queries to keep warm.
    pub titles: Vec<String>,
    /// Also warm this many of the most requested queries.
    pub top_queries: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 6 * 3_600,
            delay_ms: 1_000,
            authors: Vec::new(),
            titles: Vec::new(),
            top_queries: 20,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// [`GatewayError::Config`] for a zero breaker threshold, a zero warm
    /// interval while warming is enabled, or an invalid engine section.
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        for (name, policy) in [("paid", &self.breakers.paid), ("free", &self.breakers.free)] {
            if policy.failure_threshold == 0 {
                return Err(GatewayError::Config(format!(
                    "breakers.{name}.failure_threshold must be greater than 0"
                )));
            }
        }
        if self.warmer.enabled && self.warmer.interval_secs == 0 {
            return Err(GatewayError::Config(
                "warmer.interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: GatewayConfig = toml::from_str("").expect("parse");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.breakers.paid, BreakerPolicy::paid());
        assert!(!config.warmer.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [breakers.paid]
            failure_threshold = 2

            [engine]
            provider_timeout_ms = 2500

            [warmer]
            enabled = true
            authors = ["Stephen King", "Various"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.breakers.paid.failure_threshold, 2);
        assert_eq!(config.breakers.paid.cooldown_secs, 30);
        assert_eq!(config.engine.provider_timeout_ms, 2_500);
        assert_eq!(config.engine.stagger_ms, 100);
        assert_eq!(config.warmer.authors.len(), 2);
        assert_eq!(config.warmer.delay_ms, 1_000);
    }

    #[test]
    fn zero_breaker_threshold_rejected() {
        let mut config = GatewayConfig::default();
        config.breakers.free.failure_threshold = 0;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn invalid_engine_section_rejected() {
        let mut config = GatewayConfig::default();
        config.engine.default_max_results = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bookgate.toml");
        std::fs::write(&path, "[cache]\nhot_capacity = 50\n").expect("write");
        let config = GatewayConfig::from_file(&path).expect("load");
        assert_eq!(config.cache.hot_capacity, 50);

        std::fs::write(&path, "[warmer]\nenabled = true\ninterval_secs = 0\n").expect("write");
        assert!(GatewayConfig::from_file(&path).is_err());
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = GatewayConfig::from_file(Path::new("/nonexistent/path/bookgate.toml"));
        assert!(matches!(result, Err(GatewayError::Io(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").expect("write");
        assert!(matches!(GatewayConfig::from_file(&path), Err(GatewayError::Config(_))));
    }
}
