//! Human-readable byte counts, as printed by `df -h`.
//!
//! Multipliers are binary: `1K` is 1024 bytes, `1M` is 1024 * 1024, and so
//! on through `Y`. Magnitudes may be fractional (`1.5G`).

use thiserror::Error;

const SYMBOLS: [char; 9] = ['B', 'K', 'M', 'G', 'T', 'P', 'E', 'Z', 'Y'];

/// Fraction digits past this point are dropped before scaling.
const FRACTION_DIGITS: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("invalid unit string '{0}'")]
    InvalidUnit(String),
    #[error("byte count '{0}' is too large")]
    Overflow(String),
    #[error("invalid percentage '{0}'")]
    InvalidPercent(String),
}

/// Converts a string such as `12G` or `1.5M` into an exact byte count.
///
/// Every value needs a unit letter, except a bare `0`: `df -h` prints that
/// without a suffix for empty volumes.
pub fn parse_bytes(raw: &str) -> Result<u128, UnitError> {
    let trimmed = raw.trim();
    let invalid = || UnitError::InvalidUnit(raw.to_string());
    let overflow = || UnitError::Overflow(raw.to_string());

    let (magnitude, multiplier) = match trimmed.chars().last() {
        Some(last) if last.is_ascii_alphabetic() => {
            let letter = last.to_ascii_uppercase();
            let power = SYMBOLS
                .iter()
                .position(|symbol| *symbol == letter)
                .ok_or_else(invalid)?;
            (&trimmed[..trimmed.len() - 1], 1_u128 << (10 * power))
        }
        Some(_) if trimmed == "0" => return Ok(0),
        _ => return Err(invalid()),
    };

    let (whole, fraction) = magnitude.split_once('.').unwrap_or((magnitude, ""));
    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut bytes = whole_value.checked_mul(multiplier).ok_or_else(overflow)?;

    let fraction = &fraction[..fraction.len().min(FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let numerator: u128 = fraction.parse().map_err(|_| invalid())?;
        let digits = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        let scale = 10_u128.pow(digits);
        bytes = bytes
            .checked_add(numerator * multiplier / scale)
            .ok_or_else(overflow)?;
    }
    Ok(bytes)
}

/// Parses a capacity column such as `45%`.
pub fn parse_percent(raw: &str) -> Result<u8, UnitError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix('%').unwrap_or(trimmed);
    match digits.parse::<u8>() {
        Ok(value) if value <= 100 => Ok(value),
        _ => Err(UnitError::InvalidPercent(raw.to_string())),
    }
}
