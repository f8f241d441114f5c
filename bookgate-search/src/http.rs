//! Shared HTTP plumbing for provider adapters.
//!
//! Upstream APIs are called politely with an identifying User-Agent. The
//! client timeout is only a backstop; the executor enforces the real
//! per-call deadline.

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::SearchError;
use crate::provider::ProviderError;

/// User-Agent sent to every upstream.
pub const DEFAULT_USER_AGENT: &str = concat!("bookgate/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] for provider adapters.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(
    user_agent: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Map a request-level failure.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transport(format!("client timeout: {err}"))
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Check the status and decode a JSON body.
///
/// `not_found_is_no_results` lets lookups report 404 as
/// [`ProviderError::NoResults`] instead of an upstream failure.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    not_found_is_no_results: bool,
) -> Result<T, ProviderError> {
    let status = response.status();
    if not_found_is_no_results && status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NoResults);
    }
    if !status.is_success() {
        return Err(ProviderError::Upstream {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown status").to_owned(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Leading four-digit year of a provider date string ("1965", "1965-08-01").
pub(crate) fn parse_year(date: &str) -> Option<i32> {
    let digits: String = date.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_default_user_agent() {
        assert!(build_client(None, Duration::from_secs(8)).is_ok());
    }

    #[test]
    fn build_client_with_custom_user_agent() {
        assert!(build_client(Some("CustomBot/1.0"), Duration::from_secs(8)).is_ok());
    }

    #[test]
    fn user_agent_names_the_gateway() {
        assert!(DEFAULT_USER_AGENT.starts_with("bookgate/"));
    }

    #[test]
    fn parse_year_handles_common_shapes() {
        assert_eq!(parse_year("1965"), Some(1965));
        assert_eq!(parse_year("2005-09-13"), Some(2005));
        assert_eq!(parse_year("19"), None);
        assert_eq!(parse_year("circa 1900"), None);
    }
}
