//! Dashboard API, Health Check and Metrics Endpoint
//!
//! HTTP endpoint serving the latest price snapshot to a rendering layer, plus
//! health checks and Prometheus metrics for operators.
//!
//! # Endpoints
//!
//! - `GET /api/prices` - Returns the JSON price snapshot
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (ready once a price is known)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::RefreshController;
use crate::domain::quote::{PriceQuote, Symbol};
use crate::domain::refresh::RefreshState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Price snapshot response.
#[derive(Debug, Clone, Serialize)]
pub struct PricesResponse {
    /// One card per tracked symbol, in tracking order.
    pub cards: Vec<CardView>,
    /// True until the first cycle settles.
    pub is_loading: bool,
    /// True while a cycle is outstanding.
    pub is_refreshing: bool,
    /// Message of the most recent cycle error.
    pub last_error: Option<String>,
    /// When the last fully successful cycle settled.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Seconds until the next scheduled refresh.
    pub next_refresh_in_secs: Option<u64>,
    /// Number of settled cycles.
    pub cycles_completed: u64,
    /// When this response was generated.
    pub generated_at: DateTime<Utc>,
}

/// One price card.
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    /// Tracked symbol.
    pub symbol: Symbol,
    /// Pair label, absent until a quote is known.
    pub pair: Option<String>,
    /// Price rounded for display.
    pub price: Option<Decimal>,
    /// Full-precision price.
    pub raw_price: Option<Decimal>,
    /// When the quote was observed.
    pub observed_at: Option<DateTime<Utc>>,
    /// Oracle-reported timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Seconds since the quote was observed.
    pub age_secs: Option<u64>,
    /// Whether a fetch is outstanding for this symbol.
    pub is_updating: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Refresh loop status.
    pub refresh: RefreshStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last cycle fully succeeded.
    Healthy,
    /// Last cycle had failures but some prices are known.
    Degraded,
    /// No price has been fetched yet.
    Unhealthy,
}

/// Refresh loop status.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    /// Whether the timer is running.
    pub running: bool,
    /// Number of tracked symbols.
    pub tracked_symbols: usize,
    /// Number of symbols with a known price.
    pub priced_symbols: usize,
    /// Number of settled cycles.
    pub cycles_completed: u64,
    /// When the last cycle settled.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the last fully successful cycle settled.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Message of the most recent cycle error.
    pub last_error: Option<String>,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HttpServerState {
    version: String,
    started_at: Instant,
    controller: Arc<RefreshController>,
}

impl HttpServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, controller: Arc<RefreshController>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            controller,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Dashboard and health HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpServerState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with all endpoints.
pub fn router(state: Arc<HttpServerState>) -> Router {
    Router::new()
        .route("/api/prices", get(prices_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn prices_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    let snapshot = state.controller.snapshot();
    Json(build_prices_response(&state.controller, &snapshot, Utc::now()))
}

async fn health_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    if state.controller.snapshot().quotes().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_prices_response(
    controller: &RefreshController,
    snapshot: &RefreshState,
    now: DateTime<Utc>,
) -> PricesResponse {
    let cards = snapshot
        .cards(controller.symbols())
        .into_iter()
        .map(|card| {
            let quote = card.quote.as_ref();
            CardView {
                pair: quote.map(|q| q.pair_label().to_string()),
                price: card.display_price(),
                raw_price: quote.map(PriceQuote::price),
                observed_at: quote.map(PriceQuote::observed_at),
                source_timestamp: quote.and_then(PriceQuote::source_timestamp),
                age_secs: quote.map(|q| q.age(now).as_secs()),
                is_updating: card.is_updating,
                symbol: card.symbol,
            }
        })
        .collect();

    PricesResponse {
        cards,
        is_loading: snapshot.is_loading(),
        is_refreshing: snapshot.is_refreshing(),
        last_error: snapshot.last_error().map(ToString::to_string),
        last_success_at: snapshot.last_success_at(),
        next_refresh_in_secs: snapshot.seconds_until_next_refresh(now),
        cycles_completed: snapshot.cycles_completed(),
        generated_at: now,
    }
}

fn build_health_response(state: &HttpServerState) -> HealthResponse {
    let snapshot = state.controller.snapshot();

    HealthResponse {
        status: determine_health_status(&snapshot),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        refresh: RefreshStatus {
            running: state.controller.is_running(),
            tracked_symbols: state.controller.symbols().len(),
            priced_symbols: snapshot.quotes().len(),
            cycles_completed: snapshot.cycles_completed(),
            last_attempt_at: snapshot.last_attempt_at(),
            last_success_at: snapshot.last_success_at(),
            last_error: snapshot.last_error().map(ToString::to_string),
        },
    }
}

fn determine_health_status(snapshot: &RefreshState) -> HealthStatus {
    if snapshot.quotes().is_empty() {
        HealthStatus::Unhealthy
    } else if snapshot.last_error().is_some() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::PriceFetchPort;
    use crate::application::services::ControllerConfig;
    use crate::domain::quote::SymbolSet;
    use crate::domain::refresh::FetchError;
    use crate::infrastructure::mock::MockPriceSource;

    fn quote(symbol: &str, price: i64) -> PriceQuote {
        let symbol = Symbol::new(symbol);
        let pair = symbol.pair_label("USD");
        PriceQuote::new(symbol, pair, Decimal::from(price), Utc::now())
    }

    fn state_with(source: MockPriceSource) -> Arc<HttpServerState> {
        let symbols = SymbolSet::new(["BTC", "ETH"]).unwrap();
        let fetcher: Arc<dyn PriceFetchPort> = Arc::new(source);
        let controller = RefreshController::new(
            ControllerConfig::new(symbols, std::time::Duration::from_secs(30)),
            fetcher,
        )
        .unwrap();
        Arc::new(HttpServerState::new("test".to_string(), Arc::new(controller)))
    }

    async fn get_status(state: Arc<HttpServerState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_without_quotes() {
        assert_eq!(
            determine_health_status(&RefreshState::new()),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn determine_status_partial() {
        let mut snapshot = RefreshState::new();
        snapshot.apply_cycle(
            vec![
                (Symbol::new("BTC"), Ok(quote("BTC", 100))),
                (
                    Symbol::new("ETH"),
                    Err(FetchError::Transport {
                        message: "down".to_string(),
                    }),
                ),
            ],
            Utc::now(),
        );
        assert_eq!(determine_health_status(&snapshot), HealthStatus::Degraded);
    }

    #[test]
    fn determine_status_all_fetched() {
        let mut snapshot = RefreshState::new();
        snapshot.apply_cycle(
            vec![(Symbol::new("BTC"), Ok(quote("BTC", 100)))],
            Utc::now(),
        );
        assert_eq!(determine_health_status(&snapshot), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get_status(state_with(MockPriceSource::new()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn readiness_waits_for_first_price() {
        let state = state_with(MockPriceSource::new());
        let (status, _) = get_status(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.controller.refresh_once().await;

        let (status, body) = get_status(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"READY");
    }

    #[tokio::test]
    async fn prices_endpoint_lists_cards_in_order() {
        let source = MockPriceSource::new();
        source.set_price("BTC", Decimal::new(6_512_345, 2));
        source.fail_symbol("ETH");
        let state = state_with(source);
        state.controller.refresh_once().await;

        let (status, body) = get_status(state, "/api/prices").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["cards"][0]["symbol"], "BTC");
        assert_eq!(json["cards"][0]["price"], "65123.45");
        assert_eq!(json["cards"][1]["symbol"], "ETH");
        assert!(json["cards"][1]["price"].is_null());
        assert_eq!(json["is_loading"], false);
        assert!(json["last_error"].as_str().unwrap().contains("ETH"));
    }

    #[tokio::test]
    async fn health_reports_degraded_on_partial_failure() {
        let source = MockPriceSource::new();
        source.fail_symbol("ETH");
        let state = state_with(source);
        state.controller.refresh_once().await;

        let (status, body) = get_status(state, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["refresh"]["priced_symbols"], 1);
        assert_eq!(json["refresh"]["tracked_symbols"], 2);
    }
}
