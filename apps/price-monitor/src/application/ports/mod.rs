//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceFetchPort`: Fetches one quote for one symbol from a price source
//!
//! ## Driver Ports (Inbound)
//!
//! - `RefreshObserver`: Push notification hook for the rendering layer

use std::future::Future;

use async_trait::async_trait;

use crate::domain::quote::Symbol;
use crate::domain::refresh::{FetchResult, RefreshState};

/// Port for fetching a single symbol's price.
///
/// Each call resolves or fails exactly once. The controller places no
/// constraint on transport; adapters may call a JSON-RPC node, a REST API,
/// or generate prices locally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFetchPort: Send + Sync {
    /// Fetch the current quote for `symbol`.
    async fn fetch_one(&self, symbol: &Symbol) -> FetchResult;
}

/// Adapts an async closure into a `PriceFetchPort`.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use price_monitor::{FetchError, FnPriceFetcher, PriceQuote, Symbol};
/// use rust_decimal::Decimal;
///
/// let fetcher = FnPriceFetcher::new(|symbol: Symbol| async move {
///     let pair = symbol.pair_label("USD");
///     Ok::<_, FetchError>(PriceQuote::new(symbol, pair, Decimal::ONE, Utc::now()))
/// });
/// # let _ = fetcher;
/// ```
pub struct FnPriceFetcher<F> {
    fetch: F,
}

impl<F> FnPriceFetcher<F> {
    /// Wrap a closure.
    #[must_use]
    pub const fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F, Fut> PriceFetchPort for FnPriceFetcher<F>
where
    F: Fn(Symbol) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    async fn fetch_one(&self, symbol: &Symbol) -> FetchResult {
        (self.fetch)(symbol.clone()).await
    }
}

/// Observer notified whenever the refresh state changes.
///
/// Called synchronously from the controller after the state lock is
/// released, so implementations should return quickly. Updates are
/// delivered one at a time in the order the state changed; an observer must
/// not call `stop` on the controller that notifies it.
pub trait RefreshObserver: Send + Sync {
    /// Receive the latest state.
    fn on_update(&self, state: &RefreshState);
}

impl<F> RefreshObserver for F
where
    F: Fn(&RefreshState) + Send + Sync,
{
    fn on_update(&self, state: &RefreshState) {
        self(state);
    }
}
