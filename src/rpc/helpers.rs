//! Conversions between Ethereum JSON-RPC hex encodings and native types.

use alloy::primitives::{hex, Bytes};
use anyhow::{bail, Context, Result};

/// Parses a `0x`-prefixed hex quantity such as `"0x1b4"`.
pub fn parse_quantity(raw: &str) -> Result<u64> {
    let Some(digits) = raw.trim().strip_prefix("0x") else {
        bail!("quantity {raw:?} is missing the 0x prefix");
    };
    if digits.is_empty() {
        bail!("quantity {raw:?} has no digits");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {raw:?}"))
}

/// Encodes `value` as a minimal hex quantity, the form used for block tags.
pub fn encode_quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Decodes `0x`-prefixed hex data returned by `eth_call`.
pub fn decode_data(raw: &str) -> Result<Bytes> {
    let bytes = hex::decode(raw.trim()).with_context(|| format!("invalid hex data {raw:?}"))?;
    Ok(Bytes::from(bytes))
}
