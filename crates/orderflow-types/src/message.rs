//! EIP-712 typed message construction for marketplace orders.
//!
//! The CREATING_MESSAGE step builds a [`TypedMessage`] from the accumulated
//! workflow context; the signing capability hashes and signs it. Struct
//! hashing follows the exchange contract's `Order` layout, with a distinct
//! primary type for collection-wide bids.

use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

use crate::utils::eip712::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder};
use crate::Order;

/// EIP-712 domain name used by the marketplace contracts.
pub const DOMAIN_NAME: &str = "XY";
/// EIP-712 domain version used by the marketplace contracts.
pub const DOMAIN_VERSION: &str = "1.0";

/// The `Fee` component type string.
const FEE_TYPE: &str = "Fee(uint16 rate,address recipient)";

/// Field list shared by both order primary types. Referenced component
/// types are appended alphabetically per EIP-712.
const ORDER_FIELDS: &str = "(address trader,uint8 side,address matchingPolicy,\
address nftContract,uint256 tokenId,uint8 AssetType,uint256 amount,\
address paymentToken,uint256 price,uint256 validUntil,uint256 createAT,\
Fee[] fees,bytes extraParams,uint256 nonce)Fee(uint16 rate,address recipient)";

/// The EIP-712 domain binding a signature to one contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
	/// Domain name.
	pub name: String,
	/// Domain version.
	pub version: String,
	/// Chain the signature is valid on.
	pub chain_id: u64,
	/// The exchange contract verifying the signature.
	pub verifying_contract: Address,
}

/// Primary type of the signed struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryType {
	/// A single-token sell or buy order.
	Order,
	/// A collection-wide bid.
	CollectionOrder,
}

impl PrimaryType {
	fn name(&self) -> &'static str {
		match self {
			PrimaryType::Order => "Order",
			PrimaryType::CollectionOrder => "CollectionOrder",
		}
	}
}

/// A structured message a wallet holder signs to authorize an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedMessage {
	/// The signing domain.
	pub domain: Eip712Domain,
	/// Which struct type is being signed.
	pub primary_type: PrimaryType,
	/// The order being authorized.
	pub order: Order,
}

impl TypedMessage {
	/// Builds a typed message under the marketplace domain.
	pub fn marketplace(
		chain_id: u64,
		verifying_contract: Address,
		primary_type: PrimaryType,
		order: Order,
	) -> Self {
		Self {
			domain: Eip712Domain {
				name: DOMAIN_NAME.to_string(),
				version: DOMAIN_VERSION.to_string(),
				chain_id,
				verifying_contract,
			},
			primary_type,
			order,
		}
	}

	/// The type hash of the primary struct, including the referenced `Fee`
	/// component type.
	fn type_hash(&self) -> B256 {
		let type_string = format!("{}{}", self.primary_type.name(), ORDER_FIELDS);
		keccak256(type_string.as_bytes())
	}

	/// Hashes the order struct per EIP-712: dynamic fields (`fees`,
	/// `extraParams`) are hashed in place, static fields are encoded as
	/// 32-byte words.
	fn struct_hash(&self) -> B256 {
		let order = &self.order;

		let fee_type_hash = keccak256(FEE_TYPE.as_bytes());
		let mut fee_hashes = Vec::with_capacity(order.fees.len() * 32);
		for fee in &order.fees {
			let mut enc = Eip712AbiEncoder::new();
			enc.push_b256(&fee_type_hash);
			enc.push_u16(fee.rate);
			enc.push_address(&fee.recipient);
			fee_hashes.extend_from_slice(keccak256(enc.finish()).as_slice());
		}
		let fees_hash = keccak256(&fee_hashes);
		let extra_params_hash = keccak256(&order.extra_params);

		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&self.type_hash());
		enc.push_address(&order.trader);
		enc.push_u8(order.side.as_u8());
		enc.push_address(&order.matching_policy);
		enc.push_address(&order.nft_contract);
		enc.push_u256(order.token_id);
		enc.push_u8(order.asset_type.as_u8());
		enc.push_u256(order.amount);
		enc.push_address(&order.payment_token);
		enc.push_u256(order.price);
		enc.push_u256(order.valid_until);
		enc.push_u256(order.create_at);
		enc.push_b256(&fees_hash);
		enc.push_b256(&extra_params_hash);
		enc.push_u256(order.nonce);
		keccak256(enc.finish())
	}

	/// Computes the digest the wallet signs:
	/// keccak256(0x1901 || domainHash || structHash).
	pub fn signing_hash(&self) -> B256 {
		let domain_hash = compute_domain_hash(
			&self.domain.name,
			&self.domain.version,
			self.domain.chain_id,
			&self.domain.verifying_contract,
		);
		compute_final_digest(&domain_hash, &self.struct_hash())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{AssetType, Bytes, Fee, OrderSide, U256};

	fn sample_order() -> Order {
		Order {
			trader: Address::repeat_byte(0x01),
			side: OrderSide::Sell,
			matching_policy: Address::repeat_byte(0x02),
			nft_contract: Address::repeat_byte(0x03),
			token_id: U256::from(10),
			asset_type: AssetType::Erc721,
			amount: U256::from(1),
			payment_token: Address::ZERO,
			price: U256::from(100_000_000_000_000u64),
			valid_until: U256::from(1_700_003_600u64),
			create_at: U256::from(1_700_000_000u64),
			fees: vec![],
			extra_params: Bytes::new(),
			nonce: U256::ZERO,
		}
	}

	#[test]
	fn test_signing_hash_is_deterministic() {
		let a = TypedMessage::marketplace(
			11_155_111,
			Address::repeat_byte(0xaa),
			PrimaryType::Order,
			sample_order(),
		);
		let b = a.clone();
		assert_eq!(a.signing_hash(), b.signing_hash());
	}

	#[test]
	fn test_nonce_changes_digest() {
		let contract = Address::repeat_byte(0xaa);
		let a = TypedMessage::marketplace(1, contract, PrimaryType::Order, sample_order());
		let mut order = sample_order();
		order.nonce = U256::from(1);
		let b = TypedMessage::marketplace(1, contract, PrimaryType::Order, order);
		assert_ne!(a.signing_hash(), b.signing_hash());
	}

	#[test]
	fn test_primary_type_changes_digest() {
		let contract = Address::repeat_byte(0xaa);
		let a = TypedMessage::marketplace(1, contract, PrimaryType::Order, sample_order());
		let b =
			TypedMessage::marketplace(1, contract, PrimaryType::CollectionOrder, sample_order());
		assert_ne!(a.signing_hash(), b.signing_hash());
	}

	#[test]
	fn test_fees_change_digest() {
		let contract = Address::repeat_byte(0xaa);
		let a = TypedMessage::marketplace(1, contract, PrimaryType::Order, sample_order());
		let mut order = sample_order();
		order.fees.push(Fee {
			rate: 250,
			recipient: Address::repeat_byte(0x09),
		});
		let b = TypedMessage::marketplace(1, contract, PrimaryType::Order, order);
		assert_ne!(a.signing_hash(), b.signing_hash());
	}
}
