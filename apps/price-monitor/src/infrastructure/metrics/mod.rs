//! Prometheus Metrics Module
//!
//! Exposes refresh metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Cycles**: Settled cycles by outcome and cycle duration
//! - **Fetches**: Per-symbol fetch duration and failures by error kind
//! - **Prices**: Last known price per symbol
//! - **Freshness**: Timestamp of the last fully successful cycle
//!
//! # Integration
//!
//! Cycle metrics are recorded by `MetricsObserver`, fetch metrics by wrapping
//! a price source in `InstrumentedFetcher`. Both are exposed at `/metrics` on
//! the HTTP server port.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;

use crate::application::ports::{PriceFetchPort, RefreshObserver};
use crate::domain::quote::Symbol;
use crate::domain::refresh::{FetchError, FetchResult, RefreshState};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the already-installed handle.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Cycles
    describe_counter!(
        "price_monitor_cycles_total",
        "Total settled refresh cycles by outcome"
    );
    describe_histogram!(
        "price_monitor_cycle_duration_seconds",
        "Time from cycle start until every fetch settled"
    );

    // Fetches
    describe_counter!(
        "price_monitor_fetch_failures_total",
        "Total failed price fetches by symbol and error kind"
    );
    describe_histogram!(
        "price_monitor_fetch_duration_seconds",
        "Time to fetch a single symbol's price"
    );

    // Prices
    describe_gauge!(
        "price_monitor_price",
        "Last known good price per symbol"
    );
    describe_gauge!(
        "price_monitor_last_success_timestamp_seconds",
        "Unix time of the last fully successful refresh cycle"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for cycle outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcomeLabel {
    /// Every fetch succeeded.
    Success,
    /// At least one fetch failed.
    Failure,
}

impl CycleOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record a settled cycle.
pub fn record_cycle(outcome: CycleOutcomeLabel, duration: Option<Duration>) {
    counter!(
        "price_monitor_cycles_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);

    if let Some(duration) = duration {
        histogram!("price_monitor_cycle_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Record a single fetch.
pub fn record_fetch(symbol: &Symbol, duration: Duration, error: Option<&FetchError>) {
    histogram!(
        "price_monitor_fetch_duration_seconds",
        "symbol" => symbol.to_string()
    )
    .record(duration.as_secs_f64());

    if let Some(error) = error {
        counter!(
            "price_monitor_fetch_failures_total",
            "symbol" => symbol.to_string(),
            "kind" => error.kind()
        )
        .increment(1);
    }
}

/// Update the last known price for a symbol.
pub fn set_price(symbol: &Symbol, price: f64) {
    gauge!(
        "price_monitor_price",
        "symbol" => symbol.to_string()
    )
    .set(price);
}

/// Update the last success timestamp.
#[allow(clippy::cast_precision_loss)]
pub fn set_last_success(unix_secs: i64) {
    gauge!("price_monitor_last_success_timestamp_seconds").set(unix_secs as f64);
}

// =============================================================================
// Metrics Observer
// =============================================================================

/// Records cycle metrics from published refresh states.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    progress: Mutex<CycleProgress>,
}

#[derive(Debug, Default)]
struct CycleProgress {
    cycles_seen: u64,
    started: Option<Instant>,
}

impl MetricsObserver {
    /// Create a new observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefreshObserver for MetricsObserver {
    fn on_update(&self, state: &RefreshState) {
        let mut progress = self.progress.lock();

        if state.is_refreshing() {
            if progress.started.is_none() {
                progress.started = Some(Instant::now());
            }
            return;
        }

        if state.cycles_completed() == progress.cycles_seen {
            return;
        }
        progress.cycles_seen = state.cycles_completed();
        let duration = progress.started.take().map(|s| s.elapsed());
        drop(progress);

        let outcome = if state.last_error().is_some() {
            CycleOutcomeLabel::Failure
        } else {
            CycleOutcomeLabel::Success
        };
        record_cycle(outcome, duration);

        for (symbol, quote) in state.quotes() {
            if let Some(price) = quote.price().to_f64() {
                set_price(symbol, price);
            }
        }
        if let Some(at) = state.last_success_at() {
            set_last_success(at.timestamp());
        }
    }
}

// =============================================================================
// Instrumented Fetcher
// =============================================================================

/// Wraps a price source and records fetch duration and failures.
#[derive(Debug)]
pub struct InstrumentedFetcher<P> {
    inner: P,
}

impl<P> InstrumentedFetcher<P> {
    /// Wrap a price source.
    #[must_use]
    pub const fn new(inner: P) -> Self {
        Self { inner }
    }

    /// The wrapped source.
    #[must_use]
    pub const fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: PriceFetchPort> PriceFetchPort for InstrumentedFetcher<P> {
    async fn fetch_one(&self, symbol: &Symbol) -> FetchResult {
        let started = Instant::now();
        let result = self.inner.fetch_one(symbol).await;
        record_fetch(symbol, started.elapsed(), result.as_ref().err());
        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockPriceFetchPort;
    use crate::domain::quote::{PriceQuote, SymbolSet};

    #[test]
    fn cycle_outcome_label_as_str() {
        assert_eq!(CycleOutcomeLabel::Success.as_str(), "success");
        assert_eq!(CycleOutcomeLabel::Failure.as_str(), "failure");
    }

    #[test]
    fn observer_counts_each_settled_cycle_once() {
        let observer = MetricsObserver::new();
        let symbols = SymbolSet::new(["BTC"]).unwrap();
        let mut state = RefreshState::new();

        state.begin_cycle(&symbols);
        observer.on_update(&state);
        assert!(observer.progress.lock().started.is_some());

        let quote = PriceQuote::new(
            Symbol::new("BTC"),
            "BTC/USD".to_string(),
            Decimal::from(42),
            Utc::now(),
        );
        state.apply_cycle(vec![(Symbol::new("BTC"), Ok(quote))], Utc::now());
        observer.on_update(&state);
        observer.on_update(&state);

        let progress = observer.progress.lock();
        assert_eq!(progress.cycles_seen, 1);
        assert!(progress.started.is_none());
    }

    #[tokio::test]
    async fn instrumented_fetcher_passes_results_through() {
        let mut mock = MockPriceFetchPort::new();
        mock.expect_fetch_one().times(1).returning(|symbol| {
            Err(FetchError::UnknownSymbol {
                symbol: symbol.clone(),
            })
        });

        let fetcher: Arc<dyn PriceFetchPort> = Arc::new(InstrumentedFetcher::new(mock));
        let result = fetcher.fetch_one(&Symbol::new("FOO")).await;

        assert_eq!(
            result,
            Err(FetchError::UnknownSymbol {
                symbol: Symbol::new("FOO")
            })
        );
    }
}
