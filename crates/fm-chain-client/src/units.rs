//! Ether <-> wei conversion and JSON-RPC quantity encoding.

use crate::ChainError;
use ethers_core::types::U256;
use ethers_core::utils::parse_ether;
use serde_json::Value;

pub const ETHER_DECIMALS: usize = 18;

/// Parse a user-entered ether amount into wei.
///
/// Accepts plain decimal text (`"1"`, `"0.05"`, `".5"`). Rejects empty,
/// signed, non-numeric, zero, and over-precise input.
pub fn parse_ether_amount(input: &str) -> Result<U256, ChainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ChainError::InvalidAmount("amount is required".to_owned()));
    }
    if trimmed.starts_with('-') {
        return Err(ChainError::InvalidAmount(format!("{trimmed} is negative")));
    }

    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let numeric = !(whole.is_empty() && frac.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit());
    if !numeric {
        return Err(ChainError::InvalidAmount(format!("'{trimmed}' is not a number")));
    }
    if frac.len() > ETHER_DECIMALS {
        return Err(ChainError::InvalidAmount(format!(
            "at most {ETHER_DECIMALS} decimal places are supported"
        )));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if frac.is_empty() {
        whole.to_owned()
    } else {
        format!("{whole}.{frac}")
    };

    let wei = parse_ether(&normalized)
        .map_err(|err| ChainError::InvalidAmount(format!("'{trimmed}': {err}")))?;
    if wei.is_zero() {
        return Err(ChainError::InvalidAmount("amount must be greater than zero".to_owned()));
    }
    Ok(wei)
}

/// Human-readable ether: trailing zeros trimmed, at least one fractional digit.
pub fn format_ether(wei: U256) -> String {
    let (whole, frac) = wei.div_mod(U256::exp10(ETHER_DECIMALS));
    let frac = format!("{:018}", frac.low_u64());
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

pub fn to_quantity(value: U256) -> String {
    format!("0x{value:x}")
}

pub fn parse_quantity(value: &Value) -> Result<U256, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity '{text}' is missing 0x prefix")))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| ChainError::Decode(format!("quantity '{text}' is not hex")))
}
