//! FTSO Registry ABI
//!
//! Encoding for `getCurrentPriceWithDecimals(string)` and decoding of its
//! `(uint256 price, uint256 timestamp, uint256 decimals)` return tuple.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

/// Selector of `getCurrentPriceWithDecimals(string)`.
pub const GET_CURRENT_PRICE_WITH_DECIMALS: [u8; 4] = [0xa6, 0x9a, 0xfd, 0xc6];

/// ABI word size in bytes.
const WORD: usize = 32;

/// Largest scale a `Decimal` can carry.
const MAX_DECIMALS: u64 = 28;

/// Prices above this do not fit a `Decimal` mantissa.
const MAX_PRICE_BITS: u32 = 96;

/// ABI encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AbiError {
    /// The payload was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The payload was shorter than the expected tuple.
    #[error("expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A word did not fit the target integer.
    #[error("{field} does not fit in {bits} bits")]
    Overflow {
        /// Tuple field name.
        field: &'static str,
        /// Bit width of the target.
        bits: u32,
    },

    /// The reported decimals exceed what a `Decimal` can represent.
    #[error("decimals out of range: {0}")]
    DecimalsOutOfRange(u64),

    /// An address was not 20 bytes.
    #[error("address must be 20 bytes, got {0}")]
    AddressLength(usize),

    /// An address lacked the `0x` prefix.
    #[error("address must start with 0x")]
    AddressPrefix,
}

// =============================================================================
// Address
// =============================================================================

/// 20-byte contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// Wrap raw address bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix("0x")
            .or_else(|| s.trim().strip_prefix("0X"))
            .ok_or(AbiError::AddressPrefix)?;
        let bytes = hex::decode(digits)?;
        let array: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AbiError::AddressLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a `getCurrentPriceWithDecimals(symbol)` call as 0x-prefixed hex.
#[must_use]
pub fn encode_price_call(symbol: &str) -> String {
    let bytes = symbol.as_bytes();
    let padded_len = bytes.len().div_ceil(WORD) * WORD;
    let total = GET_CURRENT_PRICE_WITH_DECIMALS.len() + 2 * WORD + padded_len;

    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(&GET_CURRENT_PRICE_WITH_DECIMALS);
    data.extend_from_slice(&uint_word(WORD));
    data.extend_from_slice(&uint_word(bytes.len()));
    data.extend_from_slice(bytes);
    data.resize(total, 0);

    format!("0x{}", hex::encode(data))
}

fn uint_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    let value = u64::try_from(value).unwrap_or(u64::MAX);
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

// =============================================================================
// Decoding
// =============================================================================

/// Decoded return tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPrice {
    /// Price mantissa.
    pub price: u128,
    /// Oracle timestamp in Unix seconds.
    pub timestamp: u64,
    /// Number of decimals in `price`.
    pub decimals: u32,
}

impl RawPrice {
    /// Whether the registry returned its empty answer for an unknown symbol.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.price == 0 && self.timestamp == 0
    }

    /// Price scaled by `decimals`.
    ///
    /// # Errors
    ///
    /// Returns `AbiError` if the mantissa or scale is out of range.
    pub fn to_decimal(&self) -> Result<Decimal, AbiError> {
        let mantissa = i128::try_from(self.price).map_err(|_| AbiError::Overflow {
            field: "price",
            bits: MAX_PRICE_BITS,
        })?;
        Decimal::try_from_i128_with_scale(mantissa, self.decimals)
            .map_err(|_| AbiError::DecimalsOutOfRange(u64::from(self.decimals)))
    }
}

/// Decode the `(price, timestamp, decimals)` tuple from 0x-prefixed hex.
///
/// # Errors
///
/// Returns `AbiError` for malformed hex, short payloads, or values outside
/// the representable range.
pub fn decode_price_response(payload: &str) -> Result<RawPrice, AbiError> {
    let digits = payload.strip_prefix("0x").unwrap_or(payload);
    let bytes = hex::decode(digits)?;

    let expected = 3 * WORD;
    if bytes.len() < expected {
        return Err(AbiError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }

    let words: Vec<&[u8]> = bytes.chunks_exact(WORD).take(3).collect();

    let price = word_to_u128(words[0], "price", MAX_PRICE_BITS)?;
    let timestamp = word_to_u128(words[1], "timestamp", 64)?;
    let decimals = word_to_u128(words[2], "decimals", 64)?;

    let decimals = u64::try_from(decimals).unwrap_or(u64::MAX);
    if decimals > MAX_DECIMALS {
        return Err(AbiError::DecimalsOutOfRange(decimals));
    }

    Ok(RawPrice {
        price,
        timestamp: u64::try_from(timestamp).map_err(|_| AbiError::Overflow {
            field: "timestamp",
            bits: 64,
        })?,
        decimals: u32::try_from(decimals).map_err(|_| AbiError::DecimalsOutOfRange(decimals))?,
    })
}

fn word_to_u128(word: &[u8], field: &'static str, bits: u32) -> Result<u128, AbiError> {
    let (high, low) = word.split_at(WORD - 16);
    if high.iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow { field, bits });
    }

    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    let value = u128::from_be_bytes(buf);

    if bits < 128 && value >> bits != 0 {
        return Err(AbiError::Overflow { field, bits });
    }
    Ok(value)
}

// =============================================================================
// Tests
// =============================================================================
