//! Chain capability module for the NFT order workflow system.
//!
//! This module abstracts everything the workflows read from or write to a
//! blockchain: block numbers and timestamps, order nonces, native and pool
//! balances, pool deposits, NFT transfer approvals, and order matching
//! execution. Workflows consume these through a [`ChainService`] routing
//! to per-chain providers, so the underlying client library is swappable
//! without touching the state machine core.

use async_trait::async_trait;
use orderflow_types::{Address, SignedOrder, TransactionHash, TransactionReceipt, U256};
use std::collections::HashMap;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod mock;
}

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a transaction execution fails.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// Error that occurs when no suitable provider is available.
	#[error("No provider available for chain {0}")]
	NoProviderAvailable(u64),
}

/// Trait defining the interface for chain providers.
///
/// One implementation serves one chain; the [`ChainService`] routes
/// requests to the right provider by chain ID.
#[async_trait]
pub trait ChainInterface: Send + Sync {
	/// Gets the current block number.
	async fn get_block_number(&self) -> Result<u64, ChainError>;

	/// Gets the timestamp of the given block (Unix seconds).
	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

	/// Reads the order nonce for an account from the exchange contract.
	///
	/// Zero is a valid nonce for an account that has never traded.
	async fn get_order_nonce(&self, account: Address) -> Result<U256, ChainError>;

	/// Gets the native currency balance of an account.
	async fn get_native_balance(&self, account: Address) -> Result<U256, ChainError>;

	/// Gets an account's balance in the escrow pool contract.
	async fn get_pool_balance(&self, account: Address) -> Result<U256, ChainError>;

	/// Deposits native currency into the escrow pool and waits for the
	/// transaction to confirm.
	async fn deposit_to_pool(&self, amount: U256) -> Result<TransactionHash, ChainError>;

	/// Approves the given spender to transfer the NFT and waits for the
	/// approval to confirm.
	async fn approve_transfer(
		&self,
		spender: Address,
		token_id: U256,
	) -> Result<TransactionReceipt, ChainError>;

	/// Approves the given spender to draw `amount` from the caller's pool
	/// balance and waits for the approval to confirm.
	async fn approve_payment(
		&self,
		spender: Address,
		amount: U256,
	) -> Result<TransactionReceipt, ChainError>;

	/// Submits a signed collection bid to the exchange and waits for the
	/// receipt.
	async fn submit_bid(&self, bid: &SignedOrder) -> Result<TransactionReceipt, ChainError>;

	/// Submits a matched sell/buy order pair to the exchange's `execute`
	/// entrypoint, sending `value` with the call, and waits for the
	/// receipt.
	async fn execute_match(
		&self,
		sell: &SignedOrder,
		buy: &SignedOrder,
		value: U256,
	) -> Result<TransactionReceipt, ChainError>;
}

/// Service that routes chain operations to per-chain providers.
///
/// The ChainService holds one provider per supported chain ID and exposes
/// the capability methods the workflow steps call, each scoped by chain
/// ID.
pub struct ChainService {
	/// Map of chain IDs to their corresponding providers.
	providers: HashMap<u64, Box<dyn ChainInterface>>,
}

impl ChainService {
	/// Creates a new ChainService with the specified providers.
	pub fn new(providers: HashMap<u64, Box<dyn ChainInterface>>) -> Self {
		Self { providers }
	}

	/// Creates a ChainService serving a single chain.
	pub fn single(chain_id: u64, provider: Box<dyn ChainInterface>) -> Self {
		let mut providers = HashMap::new();
		providers.insert(chain_id, provider);
		Self::new(providers)
	}

	fn provider(&self, chain_id: u64) -> Result<&dyn ChainInterface, ChainError> {
		self.providers
			.get(&chain_id)
			.map(|p| p.as_ref())
			.ok_or(ChainError::NoProviderAvailable(chain_id))
	}

	/// Whether a provider is configured for the given chain.
	pub fn supports(&self, chain_id: u64) -> bool {
		self.providers.contains_key(&chain_id)
	}

	/// Gets the current block number on the given chain.
	pub async fn get_block_number(&self, chain_id: u64) -> Result<u64, ChainError> {
		self.provider(chain_id)?.get_block_number().await
	}

	/// Gets a block's timestamp on the given chain.
	pub async fn get_block_timestamp(
		&self,
		chain_id: u64,
		block_number: u64,
	) -> Result<u64, ChainError> {
		self.provider(chain_id)?
			.get_block_timestamp(block_number)
			.await
	}

	/// Reads the order nonce for an account on the given chain.
	pub async fn get_order_nonce(
		&self,
		chain_id: u64,
		account: Address,
	) -> Result<U256, ChainError> {
		self.provider(chain_id)?.get_order_nonce(account).await
	}

	/// Gets the native currency balance of an account.
	pub async fn get_native_balance(
		&self,
		chain_id: u64,
		account: Address,
	) -> Result<U256, ChainError> {
		self.provider(chain_id)?.get_native_balance(account).await
	}

	/// Gets an account's escrow pool balance.
	pub async fn get_pool_balance(
		&self,
		chain_id: u64,
		account: Address,
	) -> Result<U256, ChainError> {
		self.provider(chain_id)?.get_pool_balance(account).await
	}

	/// Deposits native currency into the escrow pool.
	pub async fn deposit_to_pool(
		&self,
		chain_id: u64,
		amount: U256,
	) -> Result<TransactionHash, ChainError> {
		self.provider(chain_id)?.deposit_to_pool(amount).await
	}

	/// Approves an NFT transfer to the given spender.
	pub async fn approve_transfer(
		&self,
		chain_id: u64,
		spender: Address,
		token_id: U256,
	) -> Result<TransactionReceipt, ChainError> {
		self.provider(chain_id)?
			.approve_transfer(spender, token_id)
			.await
	}

	/// Approves a pool payment allowance for the given spender.
	pub async fn approve_payment(
		&self,
		chain_id: u64,
		spender: Address,
		amount: U256,
	) -> Result<TransactionReceipt, ChainError> {
		self.provider(chain_id)?
			.approve_payment(spender, amount)
			.await
	}

	/// Submits a signed collection bid to the exchange.
	pub async fn submit_bid(
		&self,
		chain_id: u64,
		bid: &SignedOrder,
	) -> Result<TransactionReceipt, ChainError> {
		self.provider(chain_id)?.submit_bid(bid).await
	}

	/// Executes a sell/buy match on the exchange contract.
	pub async fn execute_match(
		&self,
		chain_id: u64,
		sell: &SignedOrder,
		buy: &SignedOrder,
		value: U256,
	) -> Result<TransactionReceipt, ChainError> {
		self.provider(chain_id)?
			.execute_match(sell, buy, value)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::mock::MockChain;

	#[tokio::test]
	async fn test_routes_by_chain_id() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let service = ChainService::single(11_155_111, Box::new(mock));

		assert!(service.supports(11_155_111));
		assert_eq!(service.get_block_number(11_155_111).await.unwrap(), 100);
	}

	#[tokio::test]
	async fn test_unknown_chain_is_rejected() {
		let service = ChainService::new(HashMap::new());
		let result = service.get_block_number(1).await;
		assert!(matches!(result, Err(ChainError::NoProviderAvailable(1))));
	}
}
