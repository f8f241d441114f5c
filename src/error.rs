//! Error types for the bookgate host.

/// Errors raised while configuring or running the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// The search engine could not be assembled.
    #[error("search engine error: {0}")]
    Search(#[from] bookgate_search::SearchError),

    /// HTTP listener error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_errors_convert() {
        let err: GatewayError = bookgate_search::SearchError::Config("no providers".into()).into();
        assert!(err.to_string().starts_with("search engine error:"));
    }

    #[test]
    fn display_server() {
        let err = GatewayError::Server("bind failed".into());
        assert_eq!(err.to_string(), "server error: bind failed");
    }
}
