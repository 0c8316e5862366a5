//! Mock chain implementation for testing.
//!
//! This module provides a configurable in-memory ChainInterface used by the
//! workflow tests: fixed block data, scripted failures with per-method
//! attempt counters, and recording of every write operation.

use crate::{ChainError, ChainInterface};
use async_trait::async_trait;
use orderflow_types::{Address, SignedOrder, TransactionHash, TransactionReceipt, U256};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
	block_number: u64,
	block_timestamp: u64,
	nonce: U256,
	native_balance: U256,
	pool_balance: U256,
	block_number_failures: u32,
	block_timestamp_failures: u32,
	fail_nonce: bool,
	fail_execute: bool,
	deposit_is_noop: bool,
	block_number_attempts: u32,
	block_timestamp_attempts: u32,
	nonce_attempts: u32,
	deposits: Vec<U256>,
	approvals: Vec<(Address, U256)>,
	payment_approvals: Vec<(Address, U256)>,
	submitted_bids: Vec<SignedOrder>,
	executions: Vec<(SignedOrder, SignedOrder, U256)>,
}

/// Mock chain provider with scripted responses and failure injection.
///
/// Clones share state, so a test can keep a handle for assertions after
/// boxing another into a [`crate::ChainService`].
#[derive(Clone)]
pub struct MockChain {
	state: Arc<Mutex<MockState>>,
}

impl MockChain {
	/// Creates a mock with zeroed state.
	#[allow(clippy::new_without_default)]
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(MockState::default())),
		}
	}

	/// Sets the current block number and its timestamp.
	pub fn with_block(self, number: u64, timestamp: u64) -> Self {
		{
			let mut state = self.lock();
			state.block_number = number;
			state.block_timestamp = timestamp;
		}
		self
	}

	/// Sets the order nonce returned for every account.
	pub fn with_nonce(self, nonce: U256) -> Self {
		self.lock().nonce = nonce;
		self
	}

	/// Sets the native balance returned for every account.
	pub fn with_native_balance(self, balance: U256) -> Self {
		self.lock().native_balance = balance;
		self
	}

	/// Sets the pool balance returned for every account.
	pub fn with_pool_balance(self, balance: U256) -> Self {
		self.lock().pool_balance = balance;
		self
	}

	/// Makes the next `count` block number reads fail.
	pub fn fail_block_number_times(self, count: u32) -> Self {
		self.lock().block_number_failures = count;
		self
	}

	/// Makes the next `count` block timestamp reads fail.
	pub fn fail_block_timestamp_times(self, count: u32) -> Self {
		self.lock().block_timestamp_failures = count;
		self
	}

	/// Makes nonce reads fail.
	pub fn fail_nonce(self) -> Self {
		self.lock().fail_nonce = true;
		self
	}

	/// Makes order matching execution revert.
	pub fn fail_execute(self) -> Self {
		self.lock().fail_execute = true;
		self
	}

	/// Makes deposits confirm without crediting the pool balance.
	pub fn with_noop_deposit(self) -> Self {
		self.lock().deposit_is_noop = true;
		self
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Number of block number reads attempted so far.
	pub fn block_number_attempts(&self) -> u32 {
		self.lock().block_number_attempts
	}

	/// Number of block timestamp reads attempted so far.
	pub fn block_timestamp_attempts(&self) -> u32 {
		self.lock().block_timestamp_attempts
	}

	/// Number of nonce reads attempted so far.
	pub fn nonce_attempts(&self) -> u32 {
		self.lock().nonce_attempts
	}

	/// Deposit amounts recorded so far.
	pub fn deposits(&self) -> Vec<U256> {
		self.lock().deposits.clone()
	}

	/// Approval (spender, token id) pairs recorded so far.
	pub fn approvals(&self) -> Vec<(Address, U256)> {
		self.lock().approvals.clone()
	}

	/// Payment approval (spender, amount) pairs recorded so far.
	pub fn payment_approvals(&self) -> Vec<(Address, U256)> {
		self.lock().payment_approvals.clone()
	}

	/// Bids submitted so far.
	pub fn submitted_bids(&self) -> Vec<SignedOrder> {
		self.lock().submitted_bids.clone()
	}

	/// Matching executions recorded so far.
	pub fn executions(&self) -> Vec<(SignedOrder, SignedOrder, U256)> {
		self.lock().executions.clone()
	}

	fn receipt(success: bool) -> TransactionReceipt {
		TransactionReceipt {
			hash: TransactionHash(vec![0xab; 32]),
			block_number: 1,
			success,
		}
	}
}

#[async_trait]
impl ChainInterface for MockChain {
	async fn get_block_number(&self) -> Result<u64, ChainError> {
		let mut state = self.lock();
		state.block_number_attempts += 1;
		if state.block_number_failures > 0 {
			state.block_number_failures -= 1;
			return Err(ChainError::Network("Mock block number failure".to_string()));
		}
		Ok(state.block_number)
	}

	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
		let mut state = self.lock();
		state.block_timestamp_attempts += 1;
		if state.block_timestamp_failures > 0 {
			state.block_timestamp_failures -= 1;
			return Err(ChainError::Network(
				"Mock block timestamp failure".to_string(),
			));
		}
		if block_number != state.block_number {
			return Err(ChainError::Network(format!(
				"Block {} not found",
				block_number
			)));
		}
		Ok(state.block_timestamp)
	}

	async fn get_order_nonce(&self, _account: Address) -> Result<U256, ChainError> {
		let mut state = self.lock();
		state.nonce_attempts += 1;
		if state.fail_nonce {
			return Err(ChainError::Network("Mock nonce failure".to_string()));
		}
		Ok(state.nonce)
	}

	async fn get_native_balance(&self, _account: Address) -> Result<U256, ChainError> {
		Ok(self.lock().native_balance)
	}

	async fn get_pool_balance(&self, _account: Address) -> Result<U256, ChainError> {
		Ok(self.lock().pool_balance)
	}

	async fn deposit_to_pool(&self, amount: U256) -> Result<TransactionHash, ChainError> {
		let mut state = self.lock();
		state.deposits.push(amount);
		if !state.deposit_is_noop {
			state.pool_balance += amount;
		}
		Ok(TransactionHash(vec![0xde; 32]))
	}

	async fn approve_transfer(
		&self,
		spender: Address,
		token_id: U256,
	) -> Result<TransactionReceipt, ChainError> {
		self.lock().approvals.push((spender, token_id));
		Ok(Self::receipt(true))
	}

	async fn approve_payment(
		&self,
		spender: Address,
		amount: U256,
	) -> Result<TransactionReceipt, ChainError> {
		self.lock().payment_approvals.push((spender, amount));
		Ok(Self::receipt(true))
	}

	async fn submit_bid(&self, bid: &SignedOrder) -> Result<TransactionReceipt, ChainError> {
		self.lock().submitted_bids.push(bid.clone());
		Ok(Self::receipt(true))
	}

	async fn execute_match(
		&self,
		sell: &SignedOrder,
		buy: &SignedOrder,
		value: U256,
	) -> Result<TransactionReceipt, ChainError> {
		let mut state = self.lock();
		state
			.executions
			.push((sell.clone(), buy.clone(), value));
		if state.fail_execute {
			return Err(ChainError::TransactionFailed(
				"Mock matching revert".to_string(),
			));
		}
		Ok(Self::receipt(true))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_scripted_block_failures_are_consumed() {
		let mock = MockChain::new()
			.with_block(50, 1_700_000_000)
			.fail_block_number_times(2);

		assert!(mock.get_block_number().await.is_err());
		assert!(mock.get_block_number().await.is_err());
		assert_eq!(mock.get_block_number().await.unwrap(), 50);
		assert_eq!(mock.block_number_attempts(), 3);
	}

	#[tokio::test]
	async fn test_deposit_credits_pool_unless_noop() {
		let mock = MockChain::new().with_pool_balance(U256::from(10));
		mock.deposit_to_pool(U256::from(5)).await.unwrap();
		assert_eq!(
			mock.get_pool_balance(Address::ZERO).await.unwrap(),
			U256::from(15)
		);

		let noop = MockChain::new().with_noop_deposit();
		noop.deposit_to_pool(U256::from(5)).await.unwrap();
		assert_eq!(
			noop.get_pool_balance(Address::ZERO).await.unwrap(),
			U256::ZERO
		);
		assert_eq!(noop.deposits(), vec![U256::from(5)]);
	}

	#[tokio::test]
	async fn test_zero_nonce_is_returned_as_a_value() {
		let mock = MockChain::new();
		assert_eq!(
			mock.get_order_nonce(Address::ZERO).await.unwrap(),
			U256::ZERO
		);
	}
}
