//! Refresh State
//!
//! The snapshot a refresh controller maintains: last known good quote per
//! symbol, the symbols currently being fetched, and the outcome of the most
//! recent cycle.
//!
//! # Rules
//!
//! - A failed fetch never removes or alters the prior quote for its symbol.
//! - A cycle with any failure sets `last_error` and leaves `last_success_at`
//!   untouched; a fully successful cycle clears `last_error`.
//! - `pending` is cleared when a cycle settles, whatever the outcome.
//! - Results are keyed by symbol, so the order they settle in does not
//!   affect the resulting state.

mod error;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub use error::{FetchError, RefreshError, SymbolFailure};

use crate::domain::quote::{PriceQuote, Symbol, SymbolSet};

/// Settled result of one symbol's fetch.
pub type FetchResult = Result<PriceQuote, FetchError>;

/// Which symbols a settled cycle priced, in the order results were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CycleTally {
    pub(crate) succeeded: Vec<Symbol>,
    pub(crate) failed: Vec<Symbol>,
}

// =============================================================================
// Refresh State
// =============================================================================

/// Latest consistent view of tracked prices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefreshState {
    quotes: BTreeMap<Symbol, PriceQuote>,
    pending: BTreeSet<Symbol>,
    last_error: Option<RefreshError>,
    last_success_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    next_refresh_at: Option<DateTime<Utc>>,
    cycles_completed: u64,
}

impl RefreshState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known good quotes, keyed by symbol.
    #[must_use]
    pub const fn quotes(&self) -> &BTreeMap<Symbol, PriceQuote> {
        &self.quotes
    }

    /// Last known good quote for a symbol.
    #[must_use]
    pub fn quote(&self, symbol: &Symbol) -> Option<&PriceQuote> {
        self.quotes.get(symbol)
    }

    /// Symbols whose fetch is currently outstanding.
    #[must_use]
    pub const fn pending(&self) -> &BTreeSet<Symbol> {
        &self.pending
    }

    /// Whether a symbol's fetch is outstanding.
    #[must_use]
    pub fn is_pending(&self, symbol: &Symbol) -> bool {
        self.pending.contains(symbol)
    }

    /// Error from the most recent cycle, if it had any failure.
    #[must_use]
    pub const fn last_error(&self) -> Option<&RefreshError> {
        self.last_error.as_ref()
    }

    /// When the last fully successful cycle settled.
    #[must_use]
    pub const fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// When the last cycle settled, successful or not.
    #[must_use]
    pub const fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// When the timer is next due to start a cycle.
    #[must_use]
    pub const fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.next_refresh_at
    }

    /// Number of cycles that have settled.
    #[must_use]
    pub const fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// True until the first cycle settles.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.cycles_completed == 0
    }

    /// True while a cycle is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whole seconds until the next scheduled cycle, rounded up.
    ///
    /// Returns `None` when no cycle is scheduled and `Some(0)` when one is
    /// overdue.
    #[must_use]
    pub fn seconds_until_next_refresh(&self, now: DateTime<Utc>) -> Option<u64> {
        let next = self.next_refresh_at?;
        let millis = (next - now).num_milliseconds();
        if millis <= 0 {
            return Some(0);
        }
        u64::try_from(millis).ok().map(|m| m.div_ceil(1000))
    }

    /// One card per tracked symbol, in tracking order.
    #[must_use]
    pub fn cards(&self, symbols: &SymbolSet) -> Vec<PriceCard> {
        symbols
            .iter()
            .map(|symbol| PriceCard {
                symbol: symbol.clone(),
                quote: self.quotes.get(symbol).cloned(),
                is_updating: self.pending.contains(symbol),
            })
            .collect()
    }

    /// Mark every symbol as pending at the start of a cycle.
    pub(crate) fn begin_cycle<'a>(&mut self, symbols: impl IntoIterator<Item = &'a Symbol>) {
        self.pending = symbols.into_iter().cloned().collect();
    }

    /// Record when the timer will next start a cycle.
    pub(crate) const fn schedule_next(&mut self, at: DateTime<Utc>) {
        self.next_refresh_at = Some(at);
    }

    /// Drop outstanding work and the schedule once the controller stops.
    pub(crate) fn halt(&mut self) {
        self.pending.clear();
        self.next_refresh_at = None;
    }

    /// Fold the settled results of a cycle into the state.
    ///
    /// A successful result whose quote names a different symbol than the one
    /// requested counts as a failure for the requested symbol.
    pub(crate) fn apply_cycle(
        &mut self,
        results: impl IntoIterator<Item = (Symbol, FetchResult)>,
        settled_at: DateTime<Utc>,
    ) -> CycleTally {
        let mut tally = CycleTally::default();
        let mut failures = Vec::new();
        let mut attempted = 0;

        for (symbol, result) in results {
            attempted += 1;
            match result {
                Ok(quote) if quote.symbol() == &symbol => {
                    tally.succeeded.push(symbol.clone());
                    self.quotes.insert(symbol, quote);
                }
                Ok(quote) => {
                    let actual = quote.symbol().clone();
                    tally.failed.push(symbol.clone());
                    failures.push(SymbolFailure::new(
                        symbol.clone(),
                        FetchError::SymbolMismatch {
                            expected: symbol,
                            actual,
                        },
                    ));
                }
                Err(cause) => {
                    tally.failed.push(symbol.clone());
                    failures.push(SymbolFailure::new(symbol, cause));
                }
            }
        }

        if failures.is_empty() {
            self.last_error = None;
            self.last_success_at = Some(settled_at);
        } else {
            failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            self.last_error = Some(RefreshError::CycleFailed {
                failures,
                attempted,
            });
        }

        self.pending.clear();
        self.last_attempt_at = Some(settled_at);
        self.cycles_completed += 1;
        tally
    }
}

// =============================================================================
// Price Card
// =============================================================================

/// Display-ready view of one tracked symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceCard {
    /// Tracked symbol.
    pub symbol: Symbol,
    /// Last known good quote, absent before the first success.
    pub quote: Option<PriceQuote>,
    /// Whether a fetch for this symbol is outstanding.
    pub is_updating: bool,
}

impl PriceCard {
    /// Price rounded for display, if a quote is known.
    #[must_use]
    pub fn display_price(&self) -> Option<Decimal> {
        self.quote.as_ref().map(PriceQuote::display_price)
    }
}

// =============================================================================
// Tests
// =============================================================================
