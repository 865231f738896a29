//! FundMe ABI surface: selectors, call encoding, revert decoding.

use crate::{ChainError, ProviderError};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::id;
use serde_json::Value;
use std::str::FromStr;

pub const FUND: &str = "fund()";
pub const WITHDRAW: &str = "withdraw()";
pub const ADDRESS_TO_AMOUNT_FUNDED: &str = "addressToAmountFunded(address)";
pub const OWNER: &str = "owner()";

/// Custom errors declared by the contract, matched by selector.
const CUSTOM_ERRORS: &[&str] = &["NotOwner"];

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

pub fn call_data(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    if !args.is_empty() {
        data.extend(abi::encode(args));
    }
    Bytes::from(data)
}

pub fn decode_hex(value: &Value) -> Result<Bytes, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex data, got {value}")))?;
    Bytes::from_str(text).map_err(|_| ChainError::Decode(format!("'{text}' is not hex data")))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, ChainError> {
    abi::decode(&[ParamType::Uint(256)], data)
        .ok()
        .and_then(|tokens| tokens.into_iter().next())
        .and_then(Token::into_uint)
        .ok_or_else(|| ChainError::Decode("expected a uint256 return value".to_owned()))
}

pub fn decode_address(data: &[u8]) -> Result<Address, ChainError> {
    abi::decode(&[ParamType::Address], data)
        .ok()
        .and_then(|tokens| tokens.into_iter().next())
        .and_then(Token::into_address)
        .ok_or_else(|| ChainError::Decode("expected an address return value".to_owned()))
}

/// Decode revert return data into a reason string.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);

    if selector == ERROR_STRING_SELECTOR {
        return abi::decode(&[ParamType::String], payload)
            .ok()?
            .into_iter()
            .next()?
            .into_string();
    }
    if selector == PANIC_SELECTOR {
        let code = abi::decode(&[ParamType::Uint(256)], payload)
            .ok()?
            .into_iter()
            .next()?
            .into_uint()?;
        return Some(format!("panic code 0x{code:x}"));
    }

    CUSTOM_ERRORS
        .iter()
        .find(|name| selector == id(format!("{name}()")))
        .map(|name| (*name).to_owned())
}

/// Classify a provider error as a revert.
///
/// `None` means the error is not a revert. `Some(reason)` is a revert, with
/// the decoded reason when the provider attached one.
pub fn revert_reason(err: &ProviderError) -> Option<Option<String>> {
    let decoded = err
        .data
        .as_ref()
        .and_then(|data| find_revert_data(data, 0))
        .and_then(|hex| Bytes::from_str(&hex).ok())
        .and_then(|bytes| decode_revert_data(&bytes));
    if decoded.is_some() {
        return Some(decoded);
    }

    let message = err.message.to_ascii_lowercase();
    if err.code == ProviderError::EXECUTION_REVERTED || message.contains("revert") {
        return Some(reason_from_message(&err.message));
    }
    None
}

fn find_revert_data(value: &Value, depth: usize) -> Option<String> {
    if depth > 3 {
        return None;
    }
    match value {
        Value::String(text) if text.starts_with("0x") && text.len() >= 10 => Some(text.clone()),
        Value::Object(map) => ["data", "originalError", "cause"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|nested| find_revert_data(nested, depth + 1)),
        _ => None,
    }
}

fn reason_from_message(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find("execution reverted")? + "execution reverted".len();
    let rest = message[start..].trim_start_matches(':').trim();
    (!rest.is_empty()).then(|| rest.to_owned())
}
