//! Conversion utilities for common data transformations.
//!
//! This module provides the decimal-string-to-wei conversion used when a
//! caller supplies a price such as "0.0001" ETH.

use alloy_primitives::U256;
use thiserror::Error;

/// Number of decimals in the native currency.
const ETH_DECIMALS: usize = 18;

/// Errors that can occur while parsing a decimal amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
	/// The input was empty or contained non-digit characters.
	#[error("Invalid decimal amount: {0}")]
	InvalidAmount(String),
	/// The fractional part had more than 18 digits.
	#[error("Too many decimal places (max {ETH_DECIMALS}): {0}")]
	TooManyDecimals(String),
}

/// Parses a decimal ETH amount (e.g. "0.0001") into wei.
///
/// Zero is a valid amount and parses to `U256::ZERO`.
pub fn parse_ether(amount: &str) -> Result<U256, ConversionError> {
	let amount = amount.trim();
	if amount.is_empty() {
		return Err(ConversionError::InvalidAmount(amount.to_string()));
	}

	let (int_part, frac_part) = match amount.split_once('.') {
		Some((i, f)) => (i, f),
		None => (amount, ""),
	};

	if frac_part.len() > ETH_DECIMALS {
		return Err(ConversionError::TooManyDecimals(amount.to_string()));
	}
	// "0.1" and ".1" are accepted; "." is not.
	if int_part.is_empty() && frac_part.is_empty() {
		return Err(ConversionError::InvalidAmount(amount.to_string()));
	}

	let digits_valid = |s: &str| s.chars().all(|c| c.is_ascii_digit());
	if !digits_valid(int_part) || !digits_valid(frac_part) {
		return Err(ConversionError::InvalidAmount(amount.to_string()));
	}

	let mut scaled = String::with_capacity(int_part.len() + ETH_DECIMALS);
	scaled.push_str(int_part);
	scaled.push_str(frac_part);
	for _ in 0..(ETH_DECIMALS - frac_part.len()) {
		scaled.push('0');
	}

	U256::from_str_radix(&scaled, 10)
		.map_err(|_| ConversionError::InvalidAmount(amount.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_whole_ether() {
		assert_eq!(
			parse_ether("1").unwrap(),
			U256::from(10).pow(U256::from(18))
		);
	}

	#[test]
	fn test_parse_fractional_ether() {
		// 0.0001 ETH = 1e14 wei
		assert_eq!(
			parse_ether("0.0001").unwrap(),
			U256::from(100_000_000_000_000u64)
		);
	}

	#[test]
	fn test_parse_zero_is_valid() {
		assert_eq!(parse_ether("0").unwrap(), U256::ZERO);
		assert_eq!(parse_ether("0.0").unwrap(), U256::ZERO);
	}

	#[test]
	fn test_rejects_garbage() {
		assert!(parse_ether("").is_err());
		assert!(parse_ether(".").is_err());
		assert!(parse_ether("1,5").is_err());
		assert!(parse_ether("abc").is_err());
	}

	#[test]
	fn test_rejects_too_many_decimals() {
		assert!(matches!(
			parse_ether("0.0000000000000000001"),
			Err(ConversionError::TooManyDecimals(_))
		));
	}
}
