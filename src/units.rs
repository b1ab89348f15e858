//! Smallest-unit / decimal-string conversion
//!
//! All balance and gas arithmetic in the core happens in integer wei
//! (`U256`); these helpers convert to and from human-readable decimal
//! strings at the UI boundary only. No floating point anywhere.

use crate::{Error, Result};
use alloy::primitives::U256;

/// Parse a decimal string ("1", "0.05") into smallest units.
pub fn parse_units(value: &str, decimals: u32) -> Result<U256> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidAmount("empty amount".to_string()));
    }

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    // "." has an empty whole and an empty frac; neither side alone proves a digit
    if whole.is_empty() && frac.is_empty() {
        return Err(Error::InvalidAmount(format!(
            "'{value}' is not a decimal number"
        )));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmount(format!(
            "'{value}' is not a decimal number"
        )));
    }
    if frac.len() > decimals as usize {
        return Err(Error::InvalidAmount(format!(
            "more than {decimals} fractional digits"
        )));
    }

    let scale = U256::from(10).pow(U256::from(decimals));
    let whole_part = U256::from_str_radix(if whole.is_empty() { "0" } else { whole }, 10)
        .map_err(|_| Error::InvalidAmount(format!("'{value}' overflows")))?
        .checked_mul(scale)
        .ok_or_else(|| Error::InvalidAmount(format!("'{value}' overflows")))?;

    let frac_part = if frac.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        U256::from_str_radix(&padded, 10)
            .map_err(|_| Error::InvalidAmount(format!("'{value}' overflows")))?
    };

    whole_part
        .checked_add(frac_part)
        .ok_or_else(|| Error::InvalidAmount(format!("'{value}' overflows")))
}

/// Format a smallest-unit value with the given number of decimals.
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        // 1 ETH = 1e18 wei
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_units(one_eth, 18), "1");

        // 1.5 ETH
        let one_point_five = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_units(one_point_five, 18), "1.5");

        // Small dust amount keeps leading zeros
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");

        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(
            parse_units("1", 18).unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(
            parse_units("1.5", 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(parse_units("0.000000000000000001", 18).unwrap(), U256::from(1u64));
        assert_eq!(parse_units("0", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("1e18", 18).is_err());
        assert!(parse_units(".", 18).is_err());
        // 19 fractional digits with 18 decimals
        assert!(parse_units("0.0000000000000000001", 18).is_err());
    }

    #[test]
    fn round_trip_at_boundary() {
        for s in ["1", "1.5", "0.001", "123456.789"] {
            let wei = parse_units(s, 18).unwrap();
            assert_eq!(format_units(wei, 18), s);
        }
    }
}
