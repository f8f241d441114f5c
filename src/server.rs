//! HTTP edge for the search router.
//!
//! ## Endpoints
//!
//! - `GET /search/{context}?q=&maxResults=&page=&forceRefresh=&lang=`
//! - `GET /health`: provider breaker states
//! - `GET /metrics`: aggregate counters and popular queries
//!
//! Successful searches return the [`SearchResponse`] JSON. Failures return
//! `{items: [], error, ...}`: 400 for a malformed request, 503 when every
//! provider was skipped, timed out or rate limited, 502 when providers
//! answered with errors, 500 if the request task died.

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bookgate_search::{
    CircuitState, MetricsSnapshot, PopularQuery, ProviderHealth, RouteError, SearchContext,
    SearchOptions, SearchResponse, SearchRouter,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{GatewayError, Result};

/// Popular queries listed by `/metrics`.
const METRICS_TOP_QUERIES: usize = 10;

/// Query string of `/search/{context}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub max_results: Option<usize>,
    pub page: Option<usize>,
    pub force_refresh: Option<bool>,
    /// Language filter passed to providers that support it.
    pub lang: Option<String>,
}

impl SearchParams {
    fn options(&self) -> SearchOptions {
        let mut params = BTreeMap::new();
        if let Some(lang) = self.lang.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            params.insert("lang".to_owned(), lang.to_owned());
        }
        SearchOptions {
            max_results: self.max_results.unwrap_or(0),
            page: self.page.unwrap_or(0),
            force_refresh: self.force_refresh.unwrap_or(false),
            params,
        }
    }
}

/// Body of every non-search error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always empty.
    pub items: Vec<serde_json::Value>,
    pub error: String,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            error: error.into(),
        }
    }
}

/// Response from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when every breaker is closed, `degraded` otherwise.
    pub status: String,
    pub providers: Vec<ProviderHealth>,
}

/// Response from `GET /metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    pub popular_queries: Vec<PopularQuery>,
}

#[derive(Clone)]
struct AppState {
    router: SearchRouter,
}

/// The HTTP listener.
pub struct SearchServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl SearchServer {
    /// Bind to `{config.host}:{config.port}` (port `0` auto-assigns) and
    /// serve in a background task until `shutdown` is cancelled. In-flight
    /// requests finish before the task exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(
        router: SearchRouter,
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let app = routes(router);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| GatewayError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Server(format!("failed to get local addr: {e}")))?;

        info!("search server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::error!("search server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the server task to exit after its shutdown token fires.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("search server task failed: {e}");
        }
    }
}

fn routes(router: SearchRouter) -> Router {
    Router::new()
        .route("/search/{context}", get(handle_search))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(AppState { router })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

/// `GET /search/{context}`
async fn handle_search(
    State(state): State<AppState>,
    Path(context): Path<String>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    let context: SearchContext = match context.parse() {
        Ok(context) => context,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let Some(query) = params.q.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "missing query parameter q");
    };

    match state.router.route(context, query, params.options()).await {
        Ok(response) => search_ok(response),
        Err(RouteError::InvalidRequest { message }) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(RouteError::AllProvidersFailed(failure)) => {
            let status = if failure.all_unavailable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, Json(failure)).into_response()
        }
        Err(RouteError::Internal { message }) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

fn search_ok(response: SearchResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

/// `GET /health`
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registered = state.router.providers();
    let providers: Vec<ProviderHealth> = state
        .router
        .breakers()
        .report()
        .into_iter()
        .filter(|h| registered.contains(&h.provider_id))
        .collect();
    let status = if providers
        .iter()
        .all(|h| h.state == CircuitState::Closed)
    {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_owned(),
        providers,
    })
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let metrics = state.router.metrics();
    Json(MetricsResponse {
        snapshot: metrics.snapshot().await,
        popular_queries: metrics.top_queries(METRICS_TOP_QUERIES).await,
    })
}
