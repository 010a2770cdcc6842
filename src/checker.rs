//! Tolerance-bounded assertions and revert expectations.
//!
//! All arithmetic is exact `U256`; the relative tolerance is converted to a WAD-scaled
//! integer once and never touches floating point after that.

use crate::error::{AdapterError, AssertionFailure, StepError, StepFailure};
use crate::utils::constants::{MAX_BPS, WAD_U256};
use alloy::primitives::U256;

/// `expected * rel`, rounded down, with `rel` quantized to 18 decimals.
pub fn approx_tolerance(expected: U256, rel: f64) -> U256 {
    let rel = rel.clamp(0.0, 1.0);
    let rel_wad = U256::from((rel * 1e18).round() as u128);
    match expected.checked_mul(rel_wad) {
        Some(product) => product / WAD_U256,
        // Only reachable for expected values near 2^196; lose the low digits instead.
        None => (expected / WAD_U256).saturating_mul(rel_wad),
    }
}

/// `value * bps / MAX_BPS`, rounded down. Exact for every `value`, including `U256::MAX`.
pub fn bps_of(value: U256, bps: u16) -> U256 {
    let bps = U256::from(bps);
    let max_bps = U256::from(MAX_BPS);
    let whole = (value / max_bps).saturating_mul(bps);
    let rest = (value % max_bps) * bps / max_bps;
    whole.saturating_add(rest)
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

pub fn assert_equal(check: &str, actual: U256, expected: U256) -> Result<(), AssertionFailure> {
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::new(check, actual, expected))
    }
}

/// `|actual - expected| <= expected * rel`.
pub fn assert_approx(
    check: &str,
    actual: U256,
    expected: U256,
    rel: f64,
) -> Result<(), AssertionFailure> {
    let tolerance = approx_tolerance(expected, rel);
    if abs_diff(actual, expected) <= tolerance {
        Ok(())
    } else {
        Err(AssertionFailure::new(
            check,
            actual,
            format!("{expected} ± {tolerance} (rel {rel})"),
        ))
    }
}

pub fn assert_at_least(check: &str, actual: U256, bound: U256) -> Result<(), AssertionFailure> {
    if actual >= bound {
        Ok(())
    } else {
        Err(AssertionFailure::new(check, actual, format!(">= {bound}")))
    }
}

pub fn assert_at_most(check: &str, actual: U256, bound: U256) -> Result<(), AssertionFailure> {
    if actual <= bound {
        Ok(())
    } else {
        Err(AssertionFailure::new(check, actual, format!("<= {bound}")))
    }
}

pub fn assert_below(check: &str, actual: U256, bound: U256) -> Result<(), AssertionFailure> {
    if actual < bound {
        Ok(())
    } else {
        Err(AssertionFailure::new(check, actual, format!("< {bound}")))
    }
}

/// The call must revert and its reason must contain `reason_substring`. An empty substring
/// accepts any revert, including ones without a decodable reason.
pub fn assert_reverts<T>(
    result: Result<T, AdapterError>,
    reason_substring: &str,
) -> Result<(), StepError> {
    let actual = match result {
        Ok(_) => {
            return Err(StepFailure::MissingRevert {
                expected: reason_substring.to_string(),
            }
            .into())
        }
        Err(err) if err.is_transport() => return Err(StepError::Transport(err.to_string())),
        Err(AdapterError::Revert { reason, .. }) => reason,
        Err(AdapterError::Halt(reason)) => Some(format!("halt: {reason}")),
        Err(other) => return Err(StepFailure::Rejected(other.to_string()).into()),
    };
    let matched = reason_substring.is_empty()
        || actual
            .as_deref()
            .is_some_and(|reason| reason.contains(reason_substring));
    if matched {
        Ok(())
    } else {
        Err(StepFailure::RevertMismatch {
            expected: reason_substring.to_string(),
            actual,
        }
        .into())
    }
}

pub fn assert_succeeds<T>(result: Result<T, AdapterError>) -> Result<T, StepError> {
    result.map_err(StepError::from)
}
