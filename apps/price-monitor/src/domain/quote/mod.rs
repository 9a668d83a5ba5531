//! Price Quote Types
//!
//! Domain types for tracked symbols and the priced observations taken for
//! them.
//!
//! # Design
//!
//! - `Symbol` is an opaque ticker, passed to price sources unchanged.
//!   Normalizing user input is the job of whoever parses it.
//! - `SymbolSet` is the non-empty, duplicate-free tracked set. Iteration
//!   order is the order the symbols were supplied in, which is also the
//!   order dashboard cards are rendered in.
//! - `PriceQuote` is immutable once constructed. A newer quote for the same
//!   symbol replaces it wholesale.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places used when rendering a price for display.
pub const DISPLAY_DECIMALS: u32 = 2;

// =============================================================================
// Symbol
// =============================================================================

/// Ticker identifier for a tracked asset (e.g. `BTC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol from its raw value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a pair label against a quote currency, e.g. `BTC/USD`.
    #[must_use]
    pub fn pair_label(&self, quote_currency: &str) -> String {
        format!("{}/{}", self.0, quote_currency.trim().to_uppercase())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Symbol Set
// =============================================================================

/// Errors raised when building a tracked symbol set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolSetError {
    /// No symbols were supplied.
    #[error("tracked symbol set cannot be empty")]
    Empty,
    /// A symbol was blank after trimming.
    #[error("symbol at position {0} is blank")]
    BlankSymbol(usize),
    /// The same symbol was supplied twice.
    #[error("duplicate symbol: {0}")]
    Duplicate(Symbol),
}

/// Non-empty, duplicate-free set of tracked symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSet {
    symbols: Vec<Symbol>,
}

impl SymbolSet {
    /// Build a tracked set, preserving the supplied order.
    ///
    /// # Errors
    ///
    /// Returns `SymbolSetError` if the input is empty, contains a blank
    /// symbol, or names the same symbol twice.
    pub fn new<I, S>(symbols: I) -> Result<Self, SymbolSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for (index, symbol) in symbols.into_iter().map(Into::into).enumerate() {
            if symbol.as_str().trim().is_empty() {
                return Err(SymbolSetError::BlankSymbol(index));
            }
            if !seen.insert(symbol.clone()) {
                return Err(SymbolSetError::Duplicate(symbol));
            }
            ordered.push(symbol);
        }

        if ordered.is_empty() {
            return Err(SymbolSetError::Empty);
        }

        Ok(Self { symbols: ordered })
    }

    /// Iterate symbols in tracking order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Check whether a symbol is tracked.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }
}

impl<'a> IntoIterator for &'a SymbolSet {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

// =============================================================================
// Price Quote
// =============================================================================

/// A priced observation for a symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    symbol: Symbol,
    pair_label: String,
    price: Decimal,
    observed_at: DateTime<Utc>,
    source_timestamp: Option<DateTime<Utc>>,
}

impl PriceQuote {
    /// Create a quote observed at `observed_at`.
    #[must_use]
    pub const fn new(
        symbol: Symbol,
        pair_label: String,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            pair_label,
            price,
            observed_at,
            source_timestamp: None,
        }
    }

    /// Attach the timestamp the price source reported for this value.
    #[must_use]
    pub fn with_source_timestamp(mut self, source_timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(source_timestamp);
        self
    }

    /// The quoted symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Pair label, e.g. `BTC/USD`.
    #[must_use]
    pub fn pair_label(&self) -> &str {
        &self.pair_label
    }

    /// Quoted price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// When this quote was observed locally.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// When the price source says the value was produced, if known.
    #[must_use]
    pub const fn source_timestamp(&self) -> Option<DateTime<Utc>> {
        self.source_timestamp
    }

    /// Price rounded to two decimal places for display.
    #[must_use]
    pub fn display_price(&self) -> Decimal {
        self.price.round_dp(DISPLAY_DECIMALS)
    }

    /// Time elapsed since the quote was observed. Zero if `now` is earlier.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).to_std().unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn quote(price: Decimal) -> PriceQuote {
        PriceQuote::new(
            Symbol::new("BTC"),
            "BTC/USD".to_string(),
            price,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn symbol_keeps_raw_value() {
        assert_eq!(Symbol::new("wBTC").as_str(), "wBTC");
        assert_eq!(Symbol::from("eth".to_string()).as_str(), "eth");
        assert_ne!(Symbol::new("eth"), Symbol::new("ETH"));
    }

    #[test]
    fn symbol_pair_label() {
        assert_eq!(Symbol::new("XRP").pair_label("usd"), "XRP/USD");
    }

    #[test]
    fn symbol_set_preserves_order() {
        let set = SymbolSet::new(["BTC", "ETH", "XRP"]).unwrap();
        let order: Vec<&str> = set.iter().map(Symbol::as_str).collect();
        assert_eq!(order, vec!["BTC", "ETH", "XRP"]);
        assert_eq!(set.len(), 3);
        assert!(set.contains(&Symbol::new("ETH")));
        assert!(!set.contains(&Symbol::new("eth")));
    }

    #[test]
    fn symbol_set_rejects_empty() {
        let empty: Vec<&str> = vec![];
        assert_eq!(SymbolSet::new(empty), Err(SymbolSetError::Empty));
    }

    #[test]
    fn symbol_set_rejects_duplicates() {
        let result = SymbolSet::new(["BTC", "ETH", "BTC"]);
        assert_eq!(result, Err(SymbolSetError::Duplicate(Symbol::new("BTC"))));
    }

    #[test]
    fn symbol_set_treats_case_variants_as_distinct() {
        let set = SymbolSet::new(["BTC", "btc"]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn symbol_set_rejects_blank() {
        assert_eq!(
            SymbolSet::new(["BTC", "  "]),
            Err(SymbolSetError::BlankSymbol(1))
        );
    }

    #[test]
    fn display_price_rounds_to_cents() {
        assert_eq!(
            quote(Decimal::new(5_012_345_678, 5)).display_price(),
            Decimal::new(5_012_346, 2)
        );
    }

    #[test]
    fn age_is_zero_for_future_quotes() {
        let q = quote(Decimal::ONE);
        let before = q.observed_at() - chrono::Duration::seconds(5);
        assert_eq!(q.age(before), Duration::ZERO);

        let after = q.observed_at() + chrono::Duration::seconds(7);
        assert_eq!(q.age(after), Duration::from_secs(7));
    }

    #[test]
    fn source_timestamp_is_optional() {
        let q = quote(Decimal::ONE);
        assert!(q.source_timestamp().is_none());

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 11, 59, 0).unwrap();
        assert_eq!(q.with_source_timestamp(ts).source_timestamp(), Some(ts));
    }
}
