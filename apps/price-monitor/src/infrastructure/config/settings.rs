//! Monitor Configuration Settings
//!
//! Configuration types for the price monitor, loaded from environment
//! variables.

use std::time::Duration;

use crate::application::services::ControllerConfig;
use crate::domain::quote::{SymbolSet, SymbolSetError};
use crate::infrastructure::ftso::{
    AbiError, Address, DEFAULT_QUOTE_CURRENCY, DEFAULT_RPC_URL, FtsoConfig,
};

/// Symbols tracked when none are configured.
pub const DEFAULT_SYMBOLS: [&str; 4] = ["BTC", "ETH", "XRP", "DOGE"];

/// Price source backing the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSourceKind {
    /// Flare FTSO registry over JSON-RPC.
    #[default]
    Ftso,
    /// In-memory random-walk prices.
    Mock,
}

impl PriceSourceKind {
    /// Parse source kind from string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownSource` for anything other than `ftso`
    /// or `mock`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "ftso" => Ok(Self::Ftso),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }

    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ftso => "ftso",
            Self::Mock => "mock",
        }
    }
}

/// Refresh timing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Time between refresh cycles.
    pub interval: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Mock source settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSettings {
    /// Maximum random-walk step per fetch, in percent.
    pub jitter_pct: f64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self { jitter_pct: 2.0 }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP API port (0 = disabled).
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8083 }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Tracked symbols.
    pub symbols: SymbolSet,
    /// Refresh timing.
    pub refresh: RefreshSettings,
    /// Selected price source.
    pub source: PriceSourceKind,
    /// FTSO adapter settings.
    pub ftso: FtsoConfig,
    /// Mock source settings.
    pub mock: MockSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let symbols = match env.get("PRICE_MONITOR_SYMBOLS") {
            Some(list) => SymbolSet::new(list.split(',').map(|s| s.trim().to_uppercase()))?,
            None => SymbolSet::new(DEFAULT_SYMBOLS)?,
        };

        let refresh = RefreshSettings {
            interval: env.duration_secs(
                "PRICE_MONITOR_REFRESH_INTERVAL_SECS",
                RefreshSettings::default().interval,
            )?,
            fetch_timeout: env.duration_secs(
                "PRICE_MONITOR_FETCH_TIMEOUT_SECS",
                RefreshSettings::default().fetch_timeout,
            )?,
        };

        let source = env
            .get("PRICE_MONITOR_SOURCE")
            .map_or(Ok(PriceSourceKind::default()), |s| PriceSourceKind::parse(&s))?;

        let rpc_url = env
            .get("FTSO_RPC_URL")
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        reqwest::Url::parse(&rpc_url).map_err(|e| ConfigError::InvalidUrl {
            key: "FTSO_RPC_URL",
            reason: e.to_string(),
        })?;

        let registry_address = match env.get("FTSO_REGISTRY_ADDRESS") {
            Some(raw) => raw
                .parse::<Address>()
                .map_err(|source| ConfigError::InvalidAddress {
                    key: "FTSO_REGISTRY_ADDRESS",
                    source,
                })?,
            None => FtsoConfig::default().registry_address,
        };

        let ftso = FtsoConfig {
            rpc_url,
            registry_address,
            quote_currency: env
                .get("FTSO_QUOTE_CURRENCY")
                .map_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string(), |c| c.to_uppercase()),
            request_timeout: refresh.fetch_timeout,
        };

        let jitter_pct = env.f64(
            "PRICE_MONITOR_MOCK_JITTER_PCT",
            MockSettings::default().jitter_pct,
        )?;
        if jitter_pct < 0.0 {
            return Err(ConfigError::InvalidNumber {
                key: "PRICE_MONITOR_MOCK_JITTER_PCT",
                value: jitter_pct.to_string(),
            });
        }

        let server = ServerSettings {
            http_port: env.u16("PRICE_MONITOR_HTTP_PORT", ServerSettings::default().http_port)?,
        };

        Ok(Self {
            symbols,
            refresh,
            source,
            ftso,
            mock: MockSettings { jitter_pct },
            server,
        })
    }

    /// Controller configuration derived from these settings.
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(self.symbols.clone(), self.refresh.interval)
            .with_fetch_timeout(self.refresh.fetch_timeout)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The tracked symbol list is empty, blank, or has duplicates.
    #[error("invalid PRICE_MONITOR_SYMBOLS: {0}")]
    InvalidSymbols(#[from] SymbolSetError),
    /// A numeric variable could not be parsed.
    #[error("environment variable {key} is not a valid number: {value}")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// A duration variable was zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroDuration(&'static str),
    /// A URL variable could not be parsed.
    #[error("environment variable {key} is not a valid URL: {reason}")]
    InvalidUrl {
        /// Variable name.
        key: &'static str,
        /// Parse failure.
        reason: String,
    },
    /// A contract address could not be parsed.
    #[error("environment variable {key} is not a valid address: {source}")]
    InvalidAddress {
        /// Variable name.
        key: &'static str,
        /// Parse failure.
        source: AbiError,
    },
    /// The price source name is not recognized.
    #[error("unknown price source: {0} (expected ftso or mock)")]
    UnknownSource(String),
}

/// Typed access to a key lookup. Empty values count as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        self.get(key).map_or(Ok(default), |value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { key, value })
        })
    }

    fn u16(&self, key: &'static str, default: u16) -> Result<u16, ConfigError> {
        self.parse(key, default)
    }

    fn f64(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse(key, default)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ConfigError::InvalidNumber {
                key,
                value: value.to_string(),
            })
        }
    }

    fn duration_secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.parse(key, default.as_secs())?;
        if secs == 0 {
            return Err(ConfigError::ZeroDuration(key));
        }
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;
    use crate::domain::quote::Symbol;

    fn config_from(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        MonitorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_dashboard() {
        let config = config_from(&[]).unwrap();

        let symbols: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "XRP", "DOGE"]);
        assert_eq!(config.refresh.interval, Duration::from_secs(30));
        assert_eq!(config.refresh.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.source, PriceSourceKind::Ftso);
        assert_eq!(config.ftso, FtsoConfig::default());
        assert_eq!(config.server.http_port, 8083);
        assert!((config.mock.jitter_pct - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("PRICE_MONITOR_SYMBOLS", "flr, sgb"),
            ("PRICE_MONITOR_REFRESH_INTERVAL_SECS", "5"),
            ("PRICE_MONITOR_SOURCE", "MOCK"),
            ("PRICE_MONITOR_HTTP_PORT", "0"),
            ("FTSO_QUOTE_CURRENCY", "eur"),
        ])
        .unwrap();

        let symbols: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["FLR", "SGB"]);
        assert_eq!(config.refresh.interval, Duration::from_secs(5));
        assert_eq!(config.source, PriceSourceKind::Mock);
        assert_eq!(config.server.http_port, 0);
        assert_eq!(config.ftso.quote_currency, "EUR");
    }

    #[test]
    fn symbols_are_normalized_before_tracking() {
        let config = config_from(&[("PRICE_MONITOR_SYMBOLS", " doge ,Btc")]).unwrap();
        let symbols: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["DOGE", "BTC"]);

        let error = config_from(&[("PRICE_MONITOR_SYMBOLS", "eth,ETH")]).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidSymbols(SymbolSetError::Duplicate(ref s)) if s.as_str() == "ETH"
        ));
    }

    #[test]
    fn controller_config_carries_timeout() {
        let config = config_from(&[("PRICE_MONITOR_FETCH_TIMEOUT_SECS", "3")]).unwrap();
        let controller = config.controller_config();
        assert_eq!(controller.fetch_timeout, Some(Duration::from_secs(3)));
        assert_eq!(controller.interval, Duration::from_secs(30));
    }

    #[test]
    fn blank_value_falls_back_to_default() {
        let config = config_from(&[("PRICE_MONITOR_REFRESH_INTERVAL_SECS", "  ")]).unwrap();
        assert_eq!(config.refresh.interval, Duration::from_secs(30));
    }

    #[test_case("PRICE_MONITOR_SYMBOLS", "BTC,btc" ; "duplicate symbol")]
    #[test_case("PRICE_MONITOR_SYMBOLS", "BTC,,ETH" ; "blank symbol")]
    #[test_case("PRICE_MONITOR_REFRESH_INTERVAL_SECS", "0" ; "zero interval")]
    #[test_case("PRICE_MONITOR_REFRESH_INTERVAL_SECS", "soon" ; "non numeric interval")]
    #[test_case("PRICE_MONITOR_FETCH_TIMEOUT_SECS", "0" ; "zero timeout")]
    #[test_case("PRICE_MONITOR_SOURCE", "coingecko" ; "unknown source")]
    #[test_case("PRICE_MONITOR_HTTP_PORT", "70000" ; "port out of range")]
    #[test_case("PRICE_MONITOR_MOCK_JITTER_PCT", "-1" ; "negative jitter")]
    #[test_case("FTSO_REGISTRY_ADDRESS", "0x1234" ; "short address")]
    #[test_case("FTSO_RPC_URL", "not a url" ; "bad url")]
    fn invalid_values_are_rejected(key: &str, value: &str) {
        assert!(config_from(&[(key, value)]).is_err());
    }

    #[test]
    fn error_messages_name_the_variable() {
        let error = config_from(&[("PRICE_MONITOR_FETCH_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "environment variable PRICE_MONITOR_FETCH_TIMEOUT_SECS must be greater than zero"
        );
    }

    #[test]
    fn source_kind_as_str() {
        assert_eq!(PriceSourceKind::Ftso.as_str(), "ftso");
        assert_eq!(PriceSourceKind::Mock.as_str(), "mock");
    }
}
