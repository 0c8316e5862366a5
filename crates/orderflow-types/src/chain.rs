//! Chain-facing types for the order workflow system.
//!
//! This module defines types returned by the RPC capability: transaction
//! hashes, receipts, chain time snapshots and pool balance checks.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain transaction hash representation.
///
/// Stores transaction hashes as raw bytes to stay independent of any one
/// client library's hash type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

/// Transaction receipt containing execution details.
///
/// Provides information about a transaction after it has been included in
/// a block, including its success status and block number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
}

/// A snapshot of blockchain time used to stamp order validity windows.
///
/// Captured by the GETTING_TIME step: the latest block number and the
/// timestamp of that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTime {
	/// Latest block number.
	pub block_number: u64,
	/// Timestamp of that block (Unix seconds).
	pub timestamp: u64,
}

/// Result of comparing a pool balance against a required bid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCheck {
	/// Whether the balance covers the required amount.
	pub sufficient: bool,
	/// Whether a deposit is needed to proceed.
	pub needs_deposit: bool,
	/// The exact shortfall to deposit; zero when sufficient.
	pub required_deposit: U256,
}

impl BalanceCheck {
	/// Compares a balance against a required amount.
	///
	/// The shortfall is the exact difference, so a deposit of
	/// `required_deposit` brings the balance to precisely the required
	/// amount.
	pub fn evaluate(balance: U256, required: U256) -> Self {
		if balance >= required {
			Self {
				sufficient: true,
				needs_deposit: false,
				required_deposit: U256::ZERO,
			}
		} else {
			Self {
				sufficient: false,
				needs_deposit: true,
				required_deposit: required - balance,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_balance_check_sufficient() {
		let check = BalanceCheck::evaluate(U256::from(10), U256::from(10));
		assert!(check.sufficient);
		assert!(!check.needs_deposit);
		assert_eq!(check.required_deposit, U256::ZERO);
	}

	#[test]
	fn test_balance_check_shortfall_is_exact() {
		let check = BalanceCheck::evaluate(U256::from(3), U256::from(10));
		assert!(!check.sufficient);
		assert!(check.needs_deposit);
		assert_eq!(check.required_deposit, U256::from(7));
	}

	#[test]
	fn test_zero_balance_requires_full_amount() {
		let check = BalanceCheck::evaluate(U256::ZERO, U256::from(42));
		assert_eq!(check.required_deposit, U256::from(42));
	}
}
