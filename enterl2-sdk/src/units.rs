//! Address and amount validation
//!
//! Pure helpers shared by the validator, the fee estimator and the
//! payment-request parser. Amounts are always handled in a token's smallest
//! unit; decimal strings are converted exactly or rejected.

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;

use crate::error::ValidationError;

/// Largest decimal precision whose unit (10^decimals) fits in a U256
pub const MAX_DECIMALS: u8 = 77;

/// Parse an address, accepting any letter case.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lower and
/// all-upper input is accepted as is.
pub fn parse_address(value: &str) -> Result<Address, ValidationError> {
    let value = value.trim();
    let hex_part = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::InvalidAddress(value.to_string()))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(value.to_string()));
    }

    let bytes =
        hex::decode(hex_part).map_err(|_| ValidationError::InvalidAddress(value.to_string()))?;
    let address = Address::from_slice(&bytes);

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None)[2..] != *hex_part {
        return Err(ValidationError::InvalidAddress(value.to_string()));
    }

    Ok(address)
}

/// Parse a token address. Same rules as [`parse_address`], different error.
pub fn parse_token(value: &str) -> Result<Address, ValidationError> {
    parse_address(value).map_err(|_| ValidationError::InvalidToken(value.trim().to_string()))
}

/// EIP-55 checksummed form of an address
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Case-insensitive address comparison on string input.
pub fn same_address(a: &str, b: &str) -> bool {
    match (parse_address(a), parse_address(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Parse a base-unit integer amount (no decimal point) that must be > 0.
pub fn parse_base_units(value: &str) -> Result<U256, ValidationError> {
    let trimmed = value.trim();
    let invalid = |reason: &str| ValidationError::InvalidAmount {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("amount is empty"));
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("must be an integer in the token's smallest unit"));
    }

    let amount = U256::from_dec_str(trimmed).map_err(|_| invalid("amount overflows 256 bits"))?;
    if amount.is_zero() {
        return Err(invalid("amount must be positive"));
    }
    Ok(amount)
}

/// Convert a human-readable decimal amount ("1.5") to base units.
///
/// Fails when the value has more fractional digits than the token supports,
/// so no precision is ever silently dropped.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, ValidationError> {
    let amount = value.trim();
    let invalid = |reason: String| ValidationError::InvalidAmount {
        value: value.to_string(),
        reason,
    };

    let (integer_part, decimal_part) = match amount.find('.') {
        Some(dot) => (&amount[..dot], &amount[dot + 1..]),
        None => (amount, ""),
    };

    if integer_part.is_empty() && decimal_part.is_empty() {
        return Err(invalid("amount is empty".to_string()));
    }
    if !integer_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("invalid integer part '{}'", integer_part)));
    }
    if !decimal_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("invalid decimal part '{}'", decimal_part)));
    }

    if decimals > MAX_DECIMALS {
        return Err(invalid(format!("{} decimals exceeds the maximum of {}", decimals, MAX_DECIMALS)));
    }
    let decimals = decimals as usize;
    if decimal_part.len() > decimals {
        return Err(invalid(format!(
            "{} decimal places but token only has {} decimals",
            decimal_part.len(),
            decimals
        )));
    }

    let raw = format!(
        "{}{}{}",
        integer_part,
        decimal_part,
        "0".repeat(decimals - decimal_part.len())
    );
    let raw = raw.trim_start_matches('0');
    if raw.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(raw).map_err(|_| invalid("amount overflows 256 bits".to_string()))
}

/// Format base units as a human-readable decimal string.
pub fn format_units(raw: U256, decimals: u8) -> Result<String, ValidationError> {
    if decimals > MAX_DECIMALS {
        return Err(ValidationError::InvalidAmount {
            value: raw.to_string(),
            reason: format!("{} decimals exceeds the maximum of {}", decimals, MAX_DECIMALS),
        });
    }
    let divisor = U256::exp10(decimals as usize);
    let whole = raw / divisor;
    let frac = raw % divisor;
    if frac.is_zero() {
        Ok(whole.to_string())
    } else {
        let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
        Ok(format!("{}.{}", whole, frac_str.trim_end_matches('0')))
    }
}
