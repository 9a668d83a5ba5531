//! Price Monitor Binary
//!
//! Starts the periodic price refresh loop and the dashboard HTTP API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-monitor
//! ```
//!
//! # Environment Variables
//!
//! - `PRICE_MONITOR_SYMBOLS`: Comma-separated symbols (default: BTC,ETH,XRP,DOGE)
//! - `PRICE_MONITOR_REFRESH_INTERVAL_SECS`: Refresh interval (default: 30)
//! - `PRICE_MONITOR_FETCH_TIMEOUT_SECS`: Per-fetch timeout (default: 10)
//! - `PRICE_MONITOR_SOURCE`: "ftso" | "mock" (default: ftso)
//! - `PRICE_MONITOR_HTTP_PORT`: HTTP API port, 0 disables (default: 8083)
//! - `PRICE_MONITOR_MOCK_JITTER_PCT`: Mock random-walk step (default: 2.0)
//! - `FTSO_RPC_URL`: JSON-RPC endpoint (default: Coston2 public RPC)
//! - `FTSO_REGISTRY_ADDRESS`: FTSO registry contract (default: Coston2 registry)
//! - `FTSO_QUOTE_CURRENCY`: Pair label suffix (default: USD)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `PRICE_MONITOR_LOG_FORMAT`: "text" or "json" (default: text)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_monitor::infrastructure::http::{HttpServer, HttpServerState};
use price_monitor::infrastructure::telemetry;
use price_monitor::{
    FtsoPriceSource, InstrumentedFetcher, MetricsObserver, MockPriceSource, MonitorConfig,
    PriceFetchPort, PriceSourceKind, RefreshController, TracingObserver, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Price Monitor");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let fetcher = build_price_source(&config)?;
    let controller = Arc::new(
        RefreshController::new(config.controller_config(), fetcher)
            .context("invalid refresh settings")?,
    );
    controller.add_observer(Arc::new(MetricsObserver::new()));
    controller.add_observer(Arc::new(TracingObserver::new(config.symbols.clone())));
    controller
        .start_timer()
        .context("failed to start refresh timer")?;

    let server_task = (config.server.http_port != 0).then(|| {
        let state = Arc::new(HttpServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&controller),
        ));
        let server = HttpServer::new(config.server.http_port, state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "HTTP server error");
            }
        })
    });

    tracing::info!("Price monitor ready");

    await_shutdown(shutdown_token).await;
    controller.stop();

    if let Some(task) = server_task
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err()
    {
        tracing::warn!("HTTP server did not stop within the shutdown timeout");
    }

    tracing::info!("Price monitor stopped");
    Ok(())
}

/// Build the configured price source, wrapped with fetch metrics.
fn build_price_source(config: &MonitorConfig) -> anyhow::Result<Arc<dyn PriceFetchPort>> {
    let fetcher: Arc<dyn PriceFetchPort> = match config.source {
        PriceSourceKind::Ftso => {
            let source = FtsoPriceSource::new(config.ftso.clone())
                .context("failed to create FTSO price source")?;
            Arc::new(InstrumentedFetcher::new(source))
        }
        PriceSourceKind::Mock => {
            let source = MockPriceSource::with_demo_prices().with_jitter(config.mock.jitter_pct);
            Arc::new(InstrumentedFetcher::new(source))
        }
    };
    Ok(fetcher)
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    let symbols: Vec<&str> = config.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        symbols = ?symbols,
        source = config.source.as_str(),
        interval_secs = config.refresh.interval.as_secs(),
        fetch_timeout_secs = config.refresh.fetch_timeout.as_secs(),
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        rpc_url = %config.ftso.rpc_url,
        registry = %config.ftso.registry_address,
        quote_currency = %config.ftso.quote_currency,
        "FTSO endpoint"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
