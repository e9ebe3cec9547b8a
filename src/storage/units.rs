// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversion between decimal amount strings and integer base units.
//!
//! Ledger arithmetic is exact: amounts are `u128` in the token's smallest
//! unit, and decimal strings only exist at the boundary. Floating point is
//! never involved.

use crate::error::{LedgerError, LedgerResult};

/// Parse a human-readable amount into base units.
///
/// # Arguments
/// * `amount` - Amount as a string (e.g., "1.5")
/// * `decimals` - Number of decimals (6 for rEUR/USDC)
pub fn parse_units(amount: &str, decimals: u8) -> LedgerResult<u128> {
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 {
        return Err(LedgerError::InvalidAmount(format!(
            "malformed decimal string '{amount}'"
        )));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| LedgerError::InvalidAmount(format!("invalid whole number in '{amount}'")))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.len() > decimals as usize {
            return Err(LedgerError::InvalidAmount(format!(
                "too many decimal places (max {decimals})"
            )));
        }
        // Pad with zeros to match decimals
        let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
        if padded.is_empty() {
            0u128
        } else {
            padded.parse::<u128>().map_err(|_| {
                LedgerError::InvalidAmount(format!("invalid decimal part in '{amount}'"))
            })?
        }
    } else {
        0u128
    };

    let multiplier = 10u128.pow(decimals as u32);
    whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(decimal_part))
        .ok_or_else(|| LedgerError::InvalidAmount(format!("amount overflow in '{amount}'")))
}

/// Format base units as a human-readable decimal string.
pub fn format_units(amount: u128, decimals: u8) -> String {
    if amount == 0 {
        return "0".to_string();
    }

    let divisor = 10u128.pow(decimals as u32);
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder == 0 {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        format!("{whole}.{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units_whole() {
        let result = parse_units("1", 6).unwrap();
        assert_eq!(result, 1_000_000);
    }

    #[test]
    fn test_parse_units_decimal() {
        let result = parse_units("1.5", 6).unwrap();
        assert_eq!(result, 1_500_000);
    }

    #[test]
    fn test_parse_units_small() {
        let result = parse_units("0.000001", 6).unwrap();
        assert_eq!(result, 1);
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert!(parse_units("1.2.3", 6).is_err());
        assert!(parse_units("abc", 6).is_err());
        assert!(parse_units("-5", 6).is_err());
        assert!(parse_units("", 6).is_err());
    }

    #[test]
    fn test_parse_units_rejects_excess_precision() {
        // 7 decimal places against a 6-decimal token
        assert!(parse_units("1.0000001", 6).is_err());
    }

    #[test]
    fn test_parse_units_rejects_overflow() {
        let huge = u128::MAX.to_string();
        assert!(parse_units(&huge, 6).is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1_000_000, 6), "1");
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(1, 6), "0.000001");
        assert_eq!(format_units(0, 6), "0");
    }

    #[test]
    fn test_round_trip() {
        for s in ["1", "1.5", "0.000001", "123456.654321"] {
            let units = parse_units(s, 6).unwrap();
            assert_eq!(format_units(units, 6), s);
        }
    }
}
