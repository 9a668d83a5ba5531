//! Flare FTSO Price Source
//!
//! Reads current prices from the FTSO registry contract with a JSON-RPC
//! `eth_call` per symbol.
//!
//! - `abi`: Calldata encoding and return tuple decoding
//! - `client`: `FtsoPriceSource`, the `PriceFetchPort` adapter

pub mod abi;
mod client;

pub use abi::{AbiError, Address};
pub use client::{
    DEFAULT_QUOTE_CURRENCY, DEFAULT_REGISTRY_ADDRESS, DEFAULT_RPC_URL, FtsoConfig, FtsoError,
    FtsoPriceSource,
};
