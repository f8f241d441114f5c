//! Bookgate: a caching gateway for book metadata search.
//!
//! The search engine itself lives in the `bookgate-search` crate. This crate
//! is the host around it:
//!
//! - **Configuration**: TOML file with defaults for every field
//! - **Assembly**: providers, cache tiers, breakers and metrics wired into
//!   a router ([`app::Gateway`])
//! - **HTTP edge**: `/search/{context}`, `/health`, `/metrics`
//!   ([`server::SearchServer`])
//! - **Periodic jobs**: cache warming and cold-tier purging
//! - **Shutdown**: stop jobs, then drain detached cache writes

pub mod app;
pub mod config;
pub mod error;
pub mod server;

pub use app::Gateway;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::SearchServer;
