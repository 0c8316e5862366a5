//! Wallet-related types for the order workflow system.
//!
//! This module defines the signature representation produced when a wallet
//! holder signs an EIP-712 typed message.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// An ECDSA signature split into the components the exchange contract
/// consumes (`v`, `r`, `s`).
///
/// The recovery id `v` uses the pre-EIP-155 convention (27 or 28) expected
/// by EIP-712 verification on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
	/// Recovery id (27 or 28).
	pub v: u8,
	/// The `r` component.
	pub r: B256,
	/// The `s` component.
	pub s: B256,
}
