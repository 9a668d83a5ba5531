//! Mock price source for demos and testing.
//!
//! Prices live in memory. Each fetch can drift the stored price by a random
//! step, fail on demand, or sleep to simulate network latency.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::Decimal;

use crate::application::ports::PriceFetchPort;
use crate::domain::quote::{PriceQuote, Symbol};
use crate::domain::refresh::{FetchError, FetchResult};

/// Price used for symbols that were never seeded.
const DEFAULT_BASE_PRICE: Decimal = Decimal::ONE_HUNDRED;

/// Scale kept on drifted prices.
const PRICE_SCALE: u32 = 8;

/// Mock price source.
#[derive(Debug)]
pub struct MockPriceSource {
    prices: RwLock<HashMap<Symbol, Decimal>>,
    failing: RwLock<HashSet<Symbol>>,
    jitter_pct: f64,
    latency: Option<Duration>,
    quote_currency: String,
}

impl Default for MockPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPriceSource {
    /// Create a source with fixed prices and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            jitter_pct: 0.0,
            latency: None,
            quote_currency: "USD".to_string(),
        }
    }

    /// Create a source seeded with realistic prices for the default symbols.
    #[must_use]
    pub fn with_demo_prices() -> Self {
        let source = Self::new();
        source.set_price("BTC", Decimal::new(65_000, 0));
        source.set_price("ETH", Decimal::new(3_500, 0));
        source.set_price("XRP", Decimal::new(52, 2));
        source.set_price("DOGE", Decimal::new(15, 2));
        source
    }

    /// Drift prices by up to `pct` percent on every fetch.
    #[must_use]
    pub fn with_jitter(mut self, pct: f64) -> Self {
        self.jitter_pct = if pct.is_finite() { pct.max(0.0) } else { 0.0 };
        self
    }

    /// Sleep for `latency` before answering.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set the price for a symbol.
    pub fn set_price(&self, symbol: impl Into<Symbol>, price: Decimal) {
        self.prices.write().insert(symbol.into(), price);
    }

    /// Current stored price for a symbol, if seeded or fetched.
    #[must_use]
    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.read().get(symbol).copied()
    }

    /// Make fetches for `symbol` fail until recovered.
    pub fn fail_symbol(&self, symbol: impl Into<Symbol>) {
        self.failing.write().insert(symbol.into());
    }

    /// Let fetches for `symbol` succeed again.
    pub fn recover_symbol(&self, symbol: &Symbol) {
        self.failing.write().remove(symbol);
    }

    fn next_price(&self, symbol: &Symbol) -> Decimal {
        let mut prices = self.prices.write();
        let current = prices.get(symbol).copied().unwrap_or(DEFAULT_BASE_PRICE);

        if self.jitter_pct <= 0.0 {
            prices.insert(symbol.clone(), current);
            return current;
        }

        let step_pct = rand::rng().random_range(-self.jitter_pct..=self.jitter_pct);
        let step = Decimal::try_from(step_pct / 100.0).unwrap_or(Decimal::ZERO);
        let drifted = (current + current * step).round_dp(PRICE_SCALE);

        let next = if drifted > Decimal::ZERO { drifted } else { current };
        prices.insert(symbol.clone(), next);
        next
    }
}

#[async_trait]
impl PriceFetchPort for MockPriceSource {
    async fn fetch_one(&self, symbol: &Symbol) -> FetchResult {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.read().contains(symbol) {
            return Err(FetchError::Transport {
                message: format!("simulated failure for {symbol}"),
            });
        }

        let price = self.next_price(symbol);
        Ok(PriceQuote::new(
            symbol.clone(),
            symbol.pair_label(&self.quote_currency),
            price,
            Utc::now(),
        ))
    }
}
