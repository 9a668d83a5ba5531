//! Configuration Module
//!
//! Configuration loading for the price monitor service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_SYMBOLS, MockSettings, MonitorConfig, PriceSourceKind, RefreshSettings,
    ServerSettings,
};
