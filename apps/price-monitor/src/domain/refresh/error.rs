//! Refresh Error Types
//!
//! Per-symbol fetch failures and the aggregated cycle failure exposed through
//! `RefreshState::last_error`.

use std::fmt::Write as _;
use std::time::Duration;

use crate::domain::quote::Symbol;

/// Failure reported by a price source for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a usable response.
    #[error("transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The price source answered with an error object.
    #[error("price source error {code}: {message}")]
    Rpc {
        /// Source-specific error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// The response could not be decoded into a quote.
    #[error("malformed price response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The price source does not know the symbol.
    #[error("symbol not supported by price source: {symbol}")]
    UnknownSymbol {
        /// The unsupported symbol.
        symbol: Symbol,
    },

    /// A quote came back for a different symbol than requested.
    #[error("requested {expected} but received a quote for {actual}")]
    SymbolMismatch {
        /// Requested symbol.
        expected: Symbol,
        /// Symbol on the returned quote.
        actual: Symbol,
    },

    /// The fetch did not settle within the configured timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The task running the fetch panicked or was aborted.
    #[error("fetch task aborted: {message}")]
    TaskAborted {
        /// Join error details.
        message: String,
    },
}

impl FetchError {
    /// Short, stable label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Rpc { .. } => "rpc",
            Self::Decode { .. } => "decode",
            Self::UnknownSymbol { .. } => "unknown_symbol",
            Self::SymbolMismatch { .. } => "symbol_mismatch",
            Self::Timeout(_) => "timeout",
            Self::TaskAborted { .. } => "task_aborted",
        }
    }
}

/// A fetch failure tied to the symbol it happened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFailure {
    /// Symbol whose fetch failed.
    pub symbol: Symbol,
    /// Why it failed.
    pub cause: FetchError,
}

impl SymbolFailure {
    /// Create a new failure record.
    #[must_use]
    pub const fn new(symbol: Symbol, cause: FetchError) -> Self {
        Self { symbol, cause }
    }
}

/// Error surfaced to observers after a refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// A single symbol's fetch failed.
    #[error("failed to fetch {symbol}: {cause}")]
    FetchFailed {
        /// Symbol whose fetch failed.
        symbol: Symbol,
        /// Underlying fetch error.
        cause: FetchError,
    },

    /// One or more fetches in a cycle failed.
    #[error(
        "refresh failed for {failed} of {attempted} symbols: {summary}",
        failed = .failures.len(),
        summary = summarize(.failures)
    )]
    CycleFailed {
        /// Failures ordered by symbol.
        failures: Vec<SymbolFailure>,
        /// Number of symbols the cycle attempted.
        attempted: usize,
    },
}

impl RefreshError {
    /// Symbols covered by this error.
    #[must_use]
    pub fn failed_symbols(&self) -> Vec<&Symbol> {
        match self {
            Self::FetchFailed { symbol, .. } => vec![symbol],
            Self::CycleFailed { failures, .. } => failures.iter().map(|f| &f.symbol).collect(),
        }
    }
}

impl From<SymbolFailure> for RefreshError {
    fn from(failure: SymbolFailure) -> Self {
        Self::FetchFailed {
            symbol: failure.symbol,
            cause: failure.cause,
        }
    }
}

fn summarize(failures: &[SymbolFailure]) -> String {
    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {}", failure.symbol, failure.cause);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_failed_message_lists_symbols() {
        let error = RefreshError::CycleFailed {
            failures: vec![
                SymbolFailure::new(
                    Symbol::new("ETH"),
                    FetchError::Timeout(Duration::from_secs(5)),
                ),
                SymbolFailure::new(
                    Symbol::new("XRP"),
                    FetchError::Rpc {
                        code: -32000,
                        message: "execution reverted".to_string(),
                    },
                ),
            ],
            attempted: 4,
        };

        let message = error.to_string();
        assert!(message.starts_with("refresh failed for 2 of 4 symbols"));
        assert!(message.contains("ETH: fetch timed out after 5s"));
        assert!(message.contains("XRP: price source error -32000: execution reverted"));
        assert_eq!(
            error.failed_symbols(),
            vec![&Symbol::new("ETH"), &Symbol::new("XRP")]
        );
    }

    #[test]
    fn fetch_failed_from_symbol_failure() {
        let failure = SymbolFailure::new(
            Symbol::new("BTC"),
            FetchError::Transport {
                message: "connection refused".to_string(),
            },
        );
        let error = RefreshError::from(failure);
        assert_eq!(
            error.to_string(),
            "failed to fetch BTC: transport error: connection refused"
        );
        assert_eq!(error.failed_symbols(), vec![&Symbol::new("BTC")]);
    }

    #[test]
    fn fetch_error_kind_labels() {
        assert_eq!(FetchError::Timeout(Duration::ZERO).kind(), "timeout");
        assert_eq!(
            FetchError::UnknownSymbol {
                symbol: Symbol::new("FOO")
            }
            .kind(),
            "unknown_symbol"
        );
    }
}
