//! FTSO JSON-RPC price source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::abi::{Address, RawPrice, decode_price_response, encode_price_call};
use crate::application::ports::PriceFetchPort;
use crate::domain::quote::{PriceQuote, Symbol};
use crate::domain::refresh::{FetchError, FetchResult};

/// Coston2 public RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://coston2-api.flare.network/ext/C/rpc";

/// FTSO registry contract on Coston2.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "0x4C54FA38F0a792A0C8E457C7BB95C10E9F52A497";

const DEFAULT_REGISTRY: Address = Address::from_bytes([
    0x4c, 0x54, 0xfa, 0x38, 0xf0, 0xa7, 0x92, 0xa0, 0xc8, 0xe4, 0x57, 0xc7, 0xbb, 0x95, 0xc1, 0x0e,
    0x9f, 0x52, 0xa4, 0x97,
]);

/// Currency the registry quotes against.
pub const DEFAULT_QUOTE_CURRENCY: &str = "USD";

// =============================================================================
// Configuration
// =============================================================================

/// FTSO adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtsoConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Registry contract address.
    pub registry_address: Address,
    /// Quote currency used in pair labels.
    pub quote_currency: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for FtsoConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            registry_address: DEFAULT_REGISTRY,
            quote_currency: DEFAULT_QUOTE_CURRENCY.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors constructing the adapter.
#[derive(Debug, thiserror::Error)]
pub enum FtsoError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// =============================================================================
// JSON-RPC Types
// =============================================================================

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: (CallParams<'a>, &'static str),
    id: u64,
}

#[derive(Debug, Serialize)]
struct CallParams<'a> {
    to: String,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

// =============================================================================
// Adapter
// =============================================================================

/// Price source backed by the FTSO registry contract.
///
/// Implements `PriceFetchPort` with one `eth_call` per symbol.
#[derive(Debug)]
pub struct FtsoPriceSource {
    client: reqwest::Client,
    config: FtsoConfig,
    next_id: AtomicU64,
}

impl FtsoPriceSource {
    /// Create a new adapter with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `FtsoError` if the HTTP client cannot be built.
    pub fn new(config: FtsoConfig) -> Result<Self, FtsoError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Adapter configuration.
    #[must_use]
    pub const fn config(&self) -> &FtsoConfig {
        &self.config
    }

    /// Call the registry for `symbol` and decode the raw tuple.
    async fn call_registry(&self, symbol: &Symbol) -> Result<RawPrice, FetchError> {
        let data = encode_price_call(symbol.as_str());
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: (
                CallParams {
                    to: self.config.registry_address.to_string(),
                    data: &data,
                },
                "latest",
            ),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transport {
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }

        let body: RpcResponse = response.json().await.map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;

        if let Some(error) = body.error {
            return Err(FetchError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = body.result.ok_or_else(|| FetchError::Decode {
            message: "response has neither result nor error".to_string(),
        })?;

        decode_price_response(&result).map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })
    }

    fn to_quote(
        &self,
        symbol: &Symbol,
        raw: RawPrice,
        observed_at: DateTime<Utc>,
    ) -> FetchResult {
        if raw.is_empty() {
            return Err(FetchError::UnknownSymbol {
                symbol: symbol.clone(),
            });
        }

        let price = raw.to_decimal().map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;

        let quote = PriceQuote::new(
            symbol.clone(),
            symbol.pair_label(&self.config.quote_currency),
            price,
            observed_at,
        );

        let source_timestamp = i64::try_from(raw.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(match source_timestamp {
            Some(ts) => quote.with_source_timestamp(ts),
            None => quote,
        })
    }
}

#[async_trait]
impl PriceFetchPort for FtsoPriceSource {
    #[tracing::instrument(skip_all, fields(symbol = %symbol))]
    async fn fetch_one(&self, symbol: &Symbol) -> FetchResult {
        let raw = self.call_registry(symbol).await?;
        let quote = self.to_quote(symbol, raw, Utc::now())?;
        tracing::debug!(price = %quote.price(), "FTSO price received");
        Ok(quote)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn source() -> FtsoPriceSource {
        FtsoPriceSource::new(FtsoConfig::default()).unwrap()
    }

    #[test]
    fn default_config_targets_coston2() {
        let config = FtsoConfig::default();
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(
            config.registry_address.to_string(),
            DEFAULT_REGISTRY_ADDRESS.to_lowercase()
        );
        assert_eq!(config.quote_currency, "USD");
    }

    #[test]
    fn request_serializes_as_eth_call() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: (
                CallParams {
                    to: "0xabc".to_string(),
                    data: "0x01",
                },
                "latest",
            ),
            id: 7,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_call",
                "params": [{"to": "0xabc", "data": "0x01"}, "latest"],
                "id": 7
            })
        );
    }

    #[test]
    fn to_quote_scales_price_and_keeps_oracle_time() {
        let observed_at = Utc::now();
        let raw = RawPrice {
            price: 250_000,
            timestamp: 1_700_000_000,
            decimals: 5,
        };

        let quote = source()
            .to_quote(&Symbol::new("XRP"), raw, observed_at)
            .unwrap();

        assert_eq!(quote.price(), Decimal::new(250_000, 5));
        assert_eq!(quote.pair_label(), "XRP/USD");
        assert_eq!(quote.observed_at(), observed_at);
        assert_eq!(
            quote.source_timestamp(),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn to_quote_maps_empty_answer_to_unknown_symbol() {
        let raw = RawPrice {
            price: 0,
            timestamp: 0,
            decimals: 5,
        };
        assert_eq!(
            source().to_quote(&Symbol::new("FOO"), raw, Utc::now()),
            Err(FetchError::UnknownSymbol {
                symbol: Symbol::new("FOO")
            })
        );
    }
}
