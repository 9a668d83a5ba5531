#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Monitor - Periodic Oracle Price Refresh
//!
//! Keeps a small dashboard of asset prices fresh by polling a price source
//! for every tracked symbol on a fixed interval, and exposes the latest
//! consistent snapshot to observers and over HTTP.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and state transitions
//!   - `quote`: Symbols, tracked symbol sets, price quotes
//!   - `refresh`: Refresh state, fetch and cycle errors
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Price source and observer interfaces
//!   - `services`: The refresh controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ftso`: Flare FTSO registry over JSON-RPC
//!   - `mock`: In-memory random-walk prices
//!   - `observers`: Log rendering of price cards
//!   - `http`: Dashboard API, health checks, metrics
//!   - `config`: Environment configuration
//!
//! # Data Flow
//!
//! ```text
//!                  ┌──────────────┐ fetch_one ┌──────────────┐
//!  timer tick ────►│   Refresh    │──────────►│ Price source │
//!                  │  Controller  │◄──────────│ (FTSO, mock) │
//!                  └──────┬───────┘  settled  └──────────────┘
//!                         │ RefreshState
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!      observers     watch channel   HTTP API
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{PriceQuote, Symbol, SymbolSet, SymbolSetError};
pub use domain::refresh::{
    FetchError, FetchResult, PriceCard, RefreshError, RefreshState, SymbolFailure,
};

// Ports
pub use application::ports::{FnPriceFetcher, PriceFetchPort, RefreshObserver};

// Refresh controller
pub use application::services::{
    ControllerConfig, ControllerError, CycleOutcome, CycleReport, RefreshController,
};

// Price sources
pub use infrastructure::ftso::{FtsoConfig, FtsoError, FtsoPriceSource};
pub use infrastructure::mock::MockPriceSource;

// Observers
pub use infrastructure::observers::TracingObserver;

// Infrastructure config
pub use infrastructure::config::{ConfigError, MonitorConfig, PriceSourceKind};

// HTTP server
pub use infrastructure::http::{HttpServer, HttpServerError, HttpServerState};

// Metrics
pub use infrastructure::metrics::{InstrumentedFetcher, MetricsObserver, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{
    LogFormat, TelemetryConfig, TelemetryGuard, init as init_telemetry,
};
