//! Refresh Controller
//!
//! Drives periodic acquisition of price quotes for a fixed set of symbols
//! and exposes the latest consistent snapshot to observers.
//!
//! # Cycle
//!
//! 1. Claim the in-flight guard; if another cycle holds it, skip.
//! 2. Mark every tracked symbol pending and publish.
//! 3. Spawn one task per symbol and wait for all of them to settle.
//! 4. Fold the results into the state (see `RefreshState`) and publish.
//!
//! Once `stop()` has been called no new cycle starts, and results of a
//! cycle that was already in flight are dropped instead of applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::ports::{PriceFetchPort, RefreshObserver};
use crate::domain::quote::{Symbol, SymbolSet};
use crate::domain::refresh::{FetchError, FetchResult, RefreshState};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a refresh controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Symbols refreshed on every cycle.
    pub symbols: SymbolSet,
    /// Time between timer ticks.
    pub interval: Duration,
    /// Upper bound on a single fetch; `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl ControllerConfig {
    /// Create a configuration without a fetch timeout.
    #[must_use]
    pub const fn new(symbols: SymbolSet, interval: Duration) -> Self {
        Self {
            symbols,
            interval,
            fetch_timeout: None,
        }
    }

    /// Bound every fetch by `timeout`.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<(), ControllerError> {
        if self.interval.is_zero() {
            return Err(ControllerError::ZeroInterval);
        }
        if self.fetch_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ControllerError::ZeroFetchTimeout);
        }
        Ok(())
    }
}

/// Errors raised when constructing or starting a controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// The refresh interval was zero.
    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
    /// The fetch timeout was zero.
    #[error("fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
    /// No Tokio runtime was available to run the timer.
    #[error("refresh timer must be started from within a Tokio runtime")]
    NoRuntime,
}

// =============================================================================
// Cycle Outcome
// =============================================================================

/// Result of a call to `refresh_once`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran and its results were applied.
    Completed(CycleReport),
    /// Another cycle was in flight; nothing was done.
    Skipped,
    /// The controller is stopped; nothing was applied.
    Stopped,
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Identifier used in the cycle's tracing span.
    pub cycle_id: Uuid,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When all fetches had settled.
    pub settled_at: DateTime<Utc>,
    /// Symbols whose fetch succeeded.
    pub succeeded: Vec<Symbol>,
    /// Symbols whose fetch failed.
    pub failed: Vec<Symbol>,
}

impl CycleReport {
    /// Whether every fetch in the cycle succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// In-Flight Guard
// =============================================================================

/// Holds the single in-flight slot until dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Controller
// =============================================================================

struct ControllerInner {
    symbols: SymbolSet,
    interval: Duration,
    fetch_timeout: Option<Duration>,
    fetcher: Arc<dyn PriceFetchPort>,
    state: RwLock<RefreshState>,
    in_flight: AtomicBool,
    stopped: AtomicBool,
    updates: watch::Sender<RefreshState>,
    observers: RwLock<Vec<Arc<dyn RefreshObserver>>>,
    publish_lock: Mutex<()>,
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic price refresh controller.
///
/// Owns its state; there is no process-wide instance. Construct one per
/// tracked symbol set and share it behind an `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use price_monitor::{ControllerConfig, MockPriceSource, RefreshController, SymbolSet};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let symbols = SymbolSet::new(["BTC", "ETH"])?;
///     let config = ControllerConfig::new(symbols, Duration::from_secs(30));
///     let controller = RefreshController::start(config, Arc::new(MockPriceSource::new()))?;
///
///     let mut updates = controller.subscribe();
///     updates.changed().await?;
///     println!("{:?}", controller.snapshot().quotes());
///
///     controller.stop();
///     Ok(())
/// }
/// ```
pub struct RefreshController {
    inner: Arc<ControllerInner>,
    timer: Mutex<Option<TimerHandle>>,
}

impl RefreshController {
    /// Create a controller without starting its timer.
    ///
    /// Cycles only run when `refresh_once` is called.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError` if the interval or fetch timeout is zero.
    pub fn new(
        config: ControllerConfig,
        fetcher: Arc<dyn PriceFetchPort>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;

        let (updates, _) = watch::channel(RefreshState::new());
        let inner = ControllerInner {
            symbols: config.symbols,
            interval: config.interval,
            fetch_timeout: config.fetch_timeout,
            fetcher,
            state: RwLock::new(RefreshState::new()),
            in_flight: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            updates,
            observers: RwLock::new(Vec::new()),
            publish_lock: Mutex::new(()),
        };

        Ok(Self {
            inner: Arc::new(inner),
            timer: Mutex::new(None),
        })
    }

    /// Create a controller and start its repeating timer.
    ///
    /// The first cycle starts immediately, before the first wait.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError` if the configuration is invalid or no Tokio
    /// runtime is available.
    pub fn start(
        config: ControllerConfig,
        fetcher: Arc<dyn PriceFetchPort>,
    ) -> Result<Self, ControllerError> {
        let controller = Self::new(config, fetcher)?;
        controller.start_timer()?;
        Ok(controller)
    }

    /// Start the repeating timer of a controller built with `new`.
    ///
    /// Does nothing if the timer is already running or the controller was
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::NoRuntime` outside a Tokio runtime.
    pub fn start_timer(&self) -> Result<(), ControllerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let mut timer = self.timer.lock();
        if timer.is_some() || self.inner.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_timer(Arc::clone(&self.inner), cancel.clone()));
        *timer = Some(TimerHandle { cancel, task });

        tracing::info!(
            symbols = self.inner.symbols.len(),
            interval_secs = self.inner.interval.as_secs_f64(),
            "Refresh timer started"
        );
        Ok(())
    }

    /// Run one refresh cycle across all tracked symbols.
    ///
    /// Never fails: per-symbol failures are recorded in the state's
    /// `last_error`.
    pub async fn refresh_once(&self) -> CycleOutcome {
        self.inner.refresh_once().await
    }

    /// Stop the timer. Idempotent.
    ///
    /// Fetches already in flight are not cancelled, but their results are
    /// discarded.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel.cancel();
            drop(timer.task);
        }
        self.inner.stop();
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some() && !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> RefreshState {
        self.inner.state.read().clone()
    }

    /// Receive every published state (latest value wins).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.inner.updates.subscribe()
    }

    /// Register a push observer.
    pub fn add_observer(&self, observer: Arc<dyn RefreshObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Tracked symbols.
    #[must_use]
    pub fn symbols(&self) -> &SymbolSet {
        &self.inner.symbols
    }

    /// Timer interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("symbols", &self.inner.symbols)
            .field("interval", &self.inner.interval)
            .field("fetch_timeout", &self.inner.fetch_timeout)
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Cycle Execution
// =============================================================================

impl ControllerInner {
    async fn refresh_once(&self) -> CycleOutcome {
        if self.stopped.load(Ordering::Acquire) {
            return CycleOutcome::Stopped;
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Refresh cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "refresh_cycle",
            %cycle_id,
            symbols = self.symbols.len()
        );

        self.run_cycle(cycle_id).instrument(span).await
    }

    async fn run_cycle(&self, cycle_id: Uuid) -> CycleOutcome {
        let started_at = Utc::now();
        let started = Instant::now();

        {
            let mut state = self.state.write();
            if self.stopped.load(Ordering::Acquire) {
                return CycleOutcome::Stopped;
            }
            state.begin_cycle(&self.symbols);
        }
        self.publish();

        let (symbols, tasks): (Vec<Symbol>, Vec<JoinHandle<FetchResult>>) = self
            .symbols
            .iter()
            .map(|symbol| {
                let fetcher = Arc::clone(&self.fetcher);
                let task_symbol = symbol.clone();
                let timeout = self.fetch_timeout;
                let task = tokio::spawn(
                    async move { fetch_symbol(fetcher.as_ref(), &task_symbol, timeout).await }
                        .in_current_span(),
                );
                (symbol.clone(), task)
            })
            .unzip();

        let results: Vec<(Symbol, FetchResult)> = symbols
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(symbol, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(FetchError::TaskAborted {
                        message: e.to_string(),
                    })
                });
                (symbol, result)
            })
            .collect();

        let settled_at = Utc::now();
        let tally = {
            let mut state = self.state.write();
            if self.stopped.load(Ordering::Acquire) {
                tracing::debug!("Controller stopped mid-cycle, discarding results");
                return CycleOutcome::Stopped;
            }
            state.apply_cycle(results, settled_at)
        };
        self.publish();

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if tally.failed.is_empty() {
            tracing::info!(
                succeeded = tally.succeeded.len(),
                elapsed_ms,
                "Refresh cycle completed"
            );
        } else {
            tracing::warn!(
                succeeded = tally.succeeded.len(),
                failed = tally.failed.len(),
                elapsed_ms,
                "Refresh cycle completed with failures"
            );
        }

        CycleOutcome::Completed(CycleReport {
            cycle_id,
            started_at,
            settled_at,
            succeeded: tally.succeeded,
            failed: tally.failed,
        })
    }

    fn schedule_next(&self, at: DateTime<Utc>) {
        {
            let mut state = self.state.write();
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            state.schedule_next(at);
        }
        self.publish();
    }

    fn stop(&self) {
        {
            let mut state = self.state.write();
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            state.halt();
        }
        self.publish();
        tracing::info!("Refresh controller stopped");
    }

    /// Send the current state to observers and subscribers.
    ///
    /// Held under `publish_lock` from read to send, so the last publish to
    /// finish always carries the newest state.
    fn publish(&self) {
        let _publishing = self.publish_lock.lock();
        let snapshot = self.state.read().clone();
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_update(&snapshot);
        }
        self.updates.send_replace(snapshot);
    }
}

async fn fetch_symbol(
    fetcher: &dyn PriceFetchPort,
    symbol: &Symbol,
    timeout: Option<Duration>,
) -> FetchResult {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch_one(symbol))
            .await
            .unwrap_or(Err(FetchError::Timeout(limit))),
        None => fetcher.fetch_one(symbol).await,
    };

    if let Err(error) = &result {
        tracing::warn!(symbol = %symbol, error = %error, "Price fetch failed");
    }
    result
}

// =============================================================================
// Timer
// =============================================================================

async fn run_timer(inner: Arc<ControllerInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let step = TimeDelta::from_std(inner.interval).ok();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Refresh timer cancelled");
                break;
            }
            _ = ticker.tick() => {
                if let Some(next) = step.and_then(|s| Utc::now().checked_add_signed(s)) {
                    inner.schedule_next(next);
                }
                let cycle = Arc::clone(&inner);
                tokio::spawn(async move {
                    if cycle.refresh_once().await == CycleOutcome::Skipped {
                        tracing::debug!("Timer tick dropped while a cycle was outstanding");
                    }
                });
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use super::*;
    use crate::application::ports::{FnPriceFetcher, MockPriceFetchPort};
    use crate::domain::quote::PriceQuote;

    fn symbols(list: &[&str]) -> SymbolSet {
        SymbolSet::new(list.iter().copied()).unwrap()
    }

    fn quote_for(symbol: &Symbol, price: i64) -> PriceQuote {
        PriceQuote::new(
            symbol.clone(),
            symbol.pair_label("USD"),
            Decimal::from(price),
            Utc::now(),
        )
    }

    fn controller(list: &[&str], fetcher: Arc<dyn PriceFetchPort>) -> RefreshController {
        RefreshController::new(
            ControllerConfig::new(symbols(list), Duration::from_secs(30)),
            fetcher,
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_interval() {
        let result = RefreshController::new(
            ControllerConfig::new(symbols(&["BTC"]), Duration::ZERO),
            Arc::new(MockPriceFetchPort::new()),
        );
        assert!(matches!(result, Err(ControllerError::ZeroInterval)));
    }

    #[test]
    fn rejects_zero_fetch_timeout() {
        let config = ControllerConfig::new(symbols(&["BTC"]), Duration::from_secs(1))
            .with_fetch_timeout(Duration::ZERO);
        let result = RefreshController::new(config, Arc::new(MockPriceFetchPort::new()));
        assert!(matches!(result, Err(ControllerError::ZeroFetchTimeout)));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let result = RefreshController::start(
            ControllerConfig::new(symbols(&["BTC"]), Duration::from_secs(1)),
            Arc::new(MockPriceFetchPort::new()),
        );
        assert!(matches!(result, Err(ControllerError::NoRuntime)));
    }

    #[tokio::test]
    async fn refresh_once_calls_fetcher_for_every_symbol() {
        let mut mock = MockPriceFetchPort::new();
        mock.expect_fetch_one()
            .times(2)
            .returning(|symbol| Ok(quote_for(symbol, 100)));

        let controller = controller(&["BTC", "ETH"], Arc::new(mock));
        let outcome = controller.refresh_once().await;

        let CycleOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle, got {outcome:?}");
        };
        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 2);

        let state = controller.snapshot();
        assert_eq!(state.quotes().len(), 2);
        assert!(state.last_error().is_none());
        assert!(state.pending().is_empty());
    }

    #[tokio::test]
    async fn failing_symbol_does_not_abort_siblings() {
        let mut mock = MockPriceFetchPort::new();
        mock.expect_fetch_one().returning(|symbol| {
            if symbol.as_str() == "ETH" {
                Err(FetchError::Transport {
                    message: "boom".to_string(),
                })
            } else {
                Ok(quote_for(symbol, 50_000))
            }
        });

        let controller = controller(&["BTC", "ETH"], Arc::new(mock));
        let CycleOutcome::Completed(report) = controller.refresh_once().await else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.succeeded, vec![Symbol::new("BTC")]);
        assert_eq!(report.failed, vec![Symbol::new("ETH")]);

        let state = controller.snapshot();
        assert_eq!(
            state.quote(&Symbol::new("BTC")).map(PriceQuote::price),
            Some(Decimal::from(50_000))
        );
        assert!(state.quote(&Symbol::new("ETH")).is_none());
        assert!(state.last_error().is_some());
        assert!(state.last_success_at().is_none());
    }

    #[tokio::test]
    async fn panicking_fetch_is_isolated() {
        let fetcher = FnPriceFetcher::new(|symbol: Symbol| async move {
            assert!(symbol.as_str() != "DOGE", "fetcher exploded");
            Ok::<_, FetchError>(quote_for(&symbol, 1))
        });

        let controller = controller(&["BTC", "DOGE"], Arc::new(fetcher));
        let CycleOutcome::Completed(report) = controller.refresh_once().await else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.failed, vec![Symbol::new("DOGE")]);
        let state = controller.snapshot();
        assert!(state.quote(&Symbol::new("BTC")).is_some());
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let fetcher = FnPriceFetcher::new(|symbol: Symbol| async move {
            if symbol.as_str() == "ETH" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, FetchError>(quote_for(&symbol, 1))
        });
        let config = ControllerConfig::new(symbols(&["BTC", "ETH"]), Duration::from_secs(30))
            .with_fetch_timeout(Duration::from_millis(50));
        let controller = RefreshController::new(config, Arc::new(fetcher)).unwrap();

        let CycleOutcome::Completed(report) = controller.refresh_once().await else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.failed, vec![Symbol::new("ETH")]);
    }

    #[tokio::test]
    async fn concurrent_cycle_is_skipped() {
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let gate = Arc::clone(&release);
        let counter = Arc::clone(&calls);
        let fetcher = FnPriceFetcher::new(move |symbol: Symbol| {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<_, FetchError>(quote_for(&symbol, 1))
            }
        });

        let controller = Arc::new(controller(&["BTC"], Arc::new(fetcher)));
        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.refresh_once().await })
        };

        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(controller.snapshot().is_refreshing());
        assert_eq!(controller.refresh_once().await, CycleOutcome::Skipped);

        release.notify_one();
        assert!(matches!(first.await.unwrap(), CycleOutcome::Completed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_discards_in_flight_results() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let gate = Arc::clone(&release);
        let signal = Arc::clone(&started);
        let fetcher = FnPriceFetcher::new(move |symbol: Symbol| {
            let gate = Arc::clone(&gate);
            let signal = Arc::clone(&signal);
            async move {
                signal.notify_one();
                gate.notified().await;
                Ok::<_, FetchError>(quote_for(&symbol, 1))
            }
        });

        let controller = Arc::new(controller(&["BTC"], Arc::new(fetcher)));
        let cycle = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.refresh_once().await })
        };

        started.notified().await;
        controller.stop();
        release.notify_one();

        assert_eq!(cycle.await.unwrap(), CycleOutcome::Stopped);
        let state = controller.snapshot();
        assert!(state.quotes().is_empty());
        assert!(state.pending().is_empty());
        assert_eq!(controller.refresh_once().await, CycleOutcome::Stopped);
    }

    #[tokio::test]
    async fn observers_see_pending_then_settled() {
        let mut mock = MockPriceFetchPort::new();
        mock.expect_fetch_one()
            .returning(|symbol| Ok(quote_for(symbol, 7)));
        let controller = controller(&["BTC"], Arc::new(mock));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        controller.add_observer(Arc::new(move |state: &RefreshState| {
            sink.lock().push((state.is_refreshing(), state.quotes().len()));
        }));

        controller.refresh_once().await;

        assert_eq!(*seen.lock(), vec![(true, 0), (false, 1)]);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let controller = controller(&["BTC"], Arc::new(MockPriceFetchPort::new()));
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
    }
}
