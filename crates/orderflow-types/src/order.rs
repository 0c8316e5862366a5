//! Marketplace order types for the workflow system.
//!
//! This module defines the order structure the exchange contract consumes,
//! together with the signed payload assembled by the BUILDING_ORDER step
//! and the result of an on-chain matching attempt.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{Signature, TransactionHash};

/// Order direction as encoded on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
	/// A listing offering an NFT for sale.
	Sell,
	/// An order to purchase an NFT.
	Buy,
}

impl OrderSide {
	/// The on-chain encoding: 0 for sell, 1 for buy.
	pub fn as_u8(&self) -> u8 {
		match self {
			OrderSide::Sell => 0,
			OrderSide::Buy => 1,
		}
	}
}

/// Asset standard of the token being traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
	/// ERC-721 (unique token).
	Erc721,
	/// ERC-1155 (semi-fungible token).
	Erc1155,
}

impl AssetType {
	/// The on-chain encoding: 0 for ERC-721, 1 for ERC-1155.
	pub fn as_u8(&self) -> u8 {
		match self {
			AssetType::Erc721 => 0,
			AssetType::Erc1155 => 1,
		}
	}
}

/// A royalty or protocol fee attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
	/// Fee rate in basis points.
	pub rate: u16,
	/// Address receiving the fee.
	pub recipient: Address,
}

/// The order structure hashed for EIP-712 signing and submitted to the
/// exchange contract.
///
/// Field order matches the contract's `Order` struct; it is load-bearing
/// for both struct hashing and calldata encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// The account creating the order.
	pub trader: Address,
	/// Buy or sell.
	pub side: OrderSide,
	/// Matching policy contract deciding how this order may be filled.
	pub matching_policy: Address,
	/// NFT collection contract.
	pub nft_contract: Address,
	/// Token id within the collection; zero for collection-wide bids.
	pub token_id: U256,
	/// Asset standard of the token.
	pub asset_type: AssetType,
	/// Quantity; always 1 for ERC-721.
	pub amount: U256,
	/// Payment token address; zero address for native currency.
	pub payment_token: Address,
	/// Price in wei. Zero is a valid price.
	pub price: U256,
	/// Chain timestamp after which the order expires.
	pub valid_until: U256,
	/// Chain timestamp at which the order was created.
	pub create_at: U256,
	/// Fees applied on settlement.
	pub fees: Vec<Fee>,
	/// Policy-specific extra parameters.
	pub extra_params: Bytes,
	/// Replay-protection counter scoped to the trader. Zero is a valid
	/// nonce.
	pub nonce: U256,
}

/// The final payload a workflow produces: an order plus the signature and
/// bookkeeping fields the exchange's `execute` entrypoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
	/// The signed order.
	pub order: Order,
	/// Signature recovery id.
	pub v: u8,
	/// Signature `r` component.
	pub r: B256,
	/// Signature `s` component.
	pub s: B256,
	/// Block number observed when the order was created.
	pub block_number: u64,
	/// 0 for single orders, 1 for batch signatures.
	pub signature_version: u8,
	/// Extra signature data; empty for single orders.
	pub extra_signature: Bytes,
}

impl SignedOrder {
	/// Assembles the submission payload from an order, its signature and
	/// the block number observed at creation time.
	pub fn assemble(order: Order, signature: &Signature, block_number: u64) -> Self {
		Self {
			order,
			v: signature.v,
			r: signature.r,
			s: signature.s,
			block_number,
			signature_version: 0,
			extra_signature: Bytes::new(),
		}
	}
}

/// Outcome of an on-chain matching attempt between a sell and a buy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
	/// Hash of the `execute` transaction.
	pub tx_hash: TransactionHash,
	/// Whether the matching transaction succeeded.
	pub confirmed: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_side_and_asset_type_encoding() {
		assert_eq!(OrderSide::Sell.as_u8(), 0);
		assert_eq!(OrderSide::Buy.as_u8(), 1);
		assert_eq!(AssetType::Erc721.as_u8(), 0);
		assert_eq!(AssetType::Erc1155.as_u8(), 1);
	}

	#[test]
	fn test_assemble_signed_order() {
		let order = Order {
			trader: Address::ZERO,
			side: OrderSide::Sell,
			matching_policy: Address::ZERO,
			nft_contract: Address::ZERO,
			token_id: U256::from(10),
			asset_type: AssetType::Erc721,
			amount: U256::from(1),
			payment_token: Address::ZERO,
			price: U256::ZERO,
			valid_until: U256::from(100),
			create_at: U256::from(40),
			fees: vec![],
			extra_params: Bytes::new(),
			nonce: U256::ZERO,
		};
		let signature = Signature {
			v: 27,
			r: B256::repeat_byte(0x11),
			s: B256::repeat_byte(0x22),
		};

		let signed = SignedOrder::assemble(order, &signature, 123);
		assert_eq!(signed.v, 27);
		assert_eq!(signed.block_number, 123);
		assert_eq!(signed.signature_version, 0);
		assert!(signed.extra_signature.is_empty());
	}
}
