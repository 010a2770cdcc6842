use alloy::primitives::{Address, U256};
use std::str::FromStr;

/// Clean a hex string by removing "0x" prefix and whitespace
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x").unwrap_or(s)
}

/// Convert a string to U256. Accepts `0x` hex, plain decimals, `max` for `U256::MAX`, and
/// `_` digit separators (`1_000`).
pub fn to_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.eq_ignore_ascii_case("max") {
        return Some(U256::MAX);
    }
    if let Some(hex) = s.strip_prefix("0x") {
        return U256::from_str_radix(hex, 16).ok();
    }

    let digits: String = s.chars().filter(|c| *c != '_').collect();
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return U256::from_str_radix(&digits, 10).ok();
    }

    None
}

pub fn parse_address(raw: &str) -> Option<Address> {
    Address::from_str(raw.trim()).ok()
}

/// Render bytes as `0x`-prefixed hex, eliding the middle of long payloads.
pub fn short_hex(bytes: &[u8]) -> String {
    const KEEP: usize = 36;
    if bytes.len() <= KEEP * 2 {
        return format!("0x{}", hex::encode(bytes));
    }
    format!(
        "0x{}..{}",
        hex::encode(&bytes[..KEEP]),
        hex::encode(&bytes[bytes.len() - 4..])
    )
}
