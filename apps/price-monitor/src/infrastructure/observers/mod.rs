//! Log Rendering Observer
//!
//! Renders the price cards to the log each time a refresh cycle settles.
//! This is the console view of the binary.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::application::ports::RefreshObserver;
use crate::domain::quote::SymbolSet;
use crate::domain::refresh::RefreshState;

/// Observer that logs one line per price card after each settled cycle.
#[derive(Debug)]
pub struct TracingObserver {
    symbols: SymbolSet,
    cycles_rendered: AtomicU64,
}

impl TracingObserver {
    /// Create an observer rendering cards for `symbols`.
    #[must_use]
    pub const fn new(symbols: SymbolSet) -> Self {
        Self {
            symbols,
            cycles_rendered: AtomicU64::new(0),
        }
    }

    /// Whether `state` carries a cycle this observer has not rendered yet.
    fn claim(&self, state: &RefreshState) -> bool {
        if state.is_refreshing() {
            return false;
        }
        let cycles = state.cycles_completed();
        self.cycles_rendered.fetch_max(cycles, Ordering::AcqRel) < cycles
    }
}

impl RefreshObserver for TracingObserver {
    fn on_update(&self, state: &RefreshState) {
        if !self.claim(state) {
            return;
        }

        let now = Utc::now();
        for card in state.cards(&self.symbols) {
            match &card.quote {
                Some(quote) => tracing::info!(
                    symbol = %card.symbol,
                    pair = quote.pair_label(),
                    price = %quote.display_price(),
                    age_secs = quote.age(now).as_secs(),
                    "Price"
                ),
                None => tracing::info!(symbol = %card.symbol, "Price unavailable"),
            }
        }

        if let Some(error) = state.last_error() {
            tracing::warn!(error = %error, "Last refresh had failures");
        }
        if let Some(secs) = state.seconds_until_next_refresh(now) {
            tracing::debug!(next_refresh_secs = secs, "Next refresh scheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::Symbol;
    use crate::domain::refresh::FetchError;

    #[test]
    fn renders_each_settled_cycle_once() {
        let symbols = SymbolSet::new(["BTC"]).unwrap();
        let observer = TracingObserver::new(symbols.clone());
        let mut state = RefreshState::new();

        assert!(!observer.claim(&state));

        state.begin_cycle(&symbols);
        assert!(!observer.claim(&state));

        state.apply_cycle(
            vec![(
                Symbol::new("BTC"),
                Err(FetchError::Transport {
                    message: "down".to_string(),
                }),
            )],
            Utc::now(),
        );
        assert!(observer.claim(&state));
        assert!(!observer.claim(&state));

        observer.on_update(&state);
        assert_eq!(observer.cycles_rendered.load(Ordering::Acquire), 1);
    }
}
