//! Alloy-based EVM chain implementation.
//!
//! This module provides a concrete implementation of the ChainInterface
//! trait using the Alloy library: block and balance reads, exchange nonce
//! lookup, pool deposits, NFT approvals, and order matching execution
//! against the marketplace contracts.

use crate::{ChainError, ChainInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{BlockNumberOrTag, BlockTransactionsKind, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use alloy_transport_http::Http;
use async_trait::async_trait;
use orderflow_types::{SignedOrder, TransactionHash, TransactionReceipt};
use std::sync::Arc;

// Solidity type definitions for the marketplace contract interactions.
sol! {
	/// Maker/taker fee entry attached to an order.
	struct Fee {
		uint16 rate;
		address recipient;
	}

	/// Order structure shared by the exchange's entrypoints.
	struct Order {
		address trader;
		uint8 side;
		address matchingPolicy;
		address nftContract;
		uint256 tokenId;
		uint8 assetType;
		uint256 amount;
		address paymentToken;
		uint256 price;
		uint256 validUntil;
		uint256 createAT;
		Fee[] fees;
		bytes extraParams;
		uint256 nonce;
	}

	/// Signed order input for `execute`.
	struct Input {
		Order order;
		uint8 v;
		bytes32 r;
		bytes32 s;
		bytes extraSignature;
		uint8 signatureVersion;
		uint256 blockNumber;
	}

	/// Marketplace exchange interface.
	interface IExchange {
		function getNonce() external view returns (uint256);
		function nonces(address account) external view returns (uint256);
		function execute(Input sell, Input buy) external payable;
		function submitBid(Input bid) external;
	}

	/// Escrow pool interface for buy-side funds.
	interface IEthPool {
		function balanceOf(address account) external view returns (uint256);
		function deposit() external payable;
		function approve(address spender, uint256 amount) external returns (bool);
	}

	/// Minimal ERC-721 surface needed for listing approvals.
	interface IErc721 {
		function approve(address to, uint256 tokenId) external;
	}
}

fn to_sol_input(signed: &SignedOrder) -> Input {
	let order = &signed.order;
	Input {
		order: Order {
			trader: order.trader,
			side: order.side.as_u8(),
			matchingPolicy: order.matching_policy,
			nftContract: order.nft_contract,
			tokenId: order.token_id,
			assetType: order.asset_type.as_u8(),
			amount: order.amount,
			paymentToken: order.payment_token,
			price: order.price,
			validUntil: order.valid_until,
			createAT: order.create_at,
			fees: order
				.fees
				.iter()
				.map(|fee| Fee {
					rate: fee.rate,
					recipient: fee.recipient,
				})
				.collect(),
			extraParams: order.extra_params.clone(),
			nonce: order.nonce,
		},
		v: signed.v,
		r: signed.r,
		s: signed.s,
		extraSignature: signed.extra_signature.clone(),
		signatureVersion: signed.signature_version,
		blockNumber: U256::from(signed.block_number),
	}
}

/// Alloy-based EVM chain implementation.
///
/// One instance serves one chain: it holds a single wallet-backed provider
/// plus the marketplace contract addresses it talks to. Write operations
/// are signed by the provider's wallet and awaited to their receipts.
pub struct AlloyChain {
	/// Alloy provider with a wallet filler for transaction submission.
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	/// Exchange contract holding nonces and the execute entrypoint.
	exchange: Address,
	/// Escrow pool contract for buy-side deposits.
	eth_pool: Address,
	/// NFT contract approvals are issued against.
	nft: Address,
}

impl AlloyChain {
	/// Creates a new AlloyChain instance.
	///
	/// Configures an Alloy provider for the given RPC URL with the signer
	/// attached for transaction submission.
	pub fn new(
		chain_id: u64,
		rpc_url: &str,
		signer: PrivateKeySigner,
		exchange: Address,
		eth_pool: Address,
		nft: Address,
	) -> Result<Self, ChainError> {
		let url = rpc_url
			.parse()
			.map_err(|e| ChainError::Network(format!("Invalid RPC URL: {}", e)))?;

		let chain_signer = signer.with_chain_id(Some(chain_id));
		let wallet = EthereumWallet::from(chain_signer);

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(Self {
			provider: Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			exchange,
			eth_pool,
			nft,
		})
	}

	/// Performs a read-only contract call and returns the raw return data.
	async fn call(
		&self,
		to: Address,
		from: Option<Address>,
		data: Vec<u8>,
	) -> Result<Bytes, ChainError> {
		let mut request = TransactionRequest::default().to(to).input(data.into());
		if let Some(from) = from {
			request = request.from(from);
		}

		self.provider
			.call(&request)
			.await
			.map_err(|e| ChainError::Network(format!("Contract call failed: {}", e)))
	}

	/// Sends a transaction and waits for its receipt.
	async fn send(&self, request: TransactionRequest) -> Result<TransactionReceipt, ChainError> {
		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(tx_hash = %tx_hash, "Submitted transaction");

		let receipt = pending
			.get_receipt()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
		})
	}
}

#[async_trait]
impl ChainInterface for AlloyChain {
	async fn get_block_number(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
		let block = self
			.provider
			.get_block_by_number(
				BlockNumberOrTag::Number(block_number),
				BlockTransactionsKind::Hashes,
			)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get block: {}", e)))?
			.ok_or_else(|| {
				ChainError::Network(format!("Block {} not found", block_number))
			})?;

		Ok(block.header.timestamp)
	}

	async fn get_order_nonce(&self, account: Address) -> Result<U256, ChainError> {
		// Older exchange deployments expose getNonce() keyed on the
		// caller; newer ones expose nonces(address). Try both.
		let data = IExchange::getNonceCall {}.abi_encode();
		match self.call(self.exchange, Some(account), data).await {
			Ok(result) => {
				let decoded = IExchange::getNonceCall::abi_decode_returns(&result, true)
					.map_err(|e| {
						ChainError::Network(format!("Invalid getNonce response: {}", e))
					})?;
				Ok(decoded._0)
			}
			Err(_) => {
				let data = IExchange::noncesCall { account }.abi_encode();
				let result = self.call(self.exchange, None, data).await?;
				let decoded = IExchange::noncesCall::abi_decode_returns(&result, true)
					.map_err(|e| {
						ChainError::Network(format!("Invalid nonces response: {}", e))
					})?;
				Ok(decoded._0)
			}
		}
	}

	async fn get_native_balance(&self, account: Address) -> Result<U256, ChainError> {
		self.provider
			.get_balance(account)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get balance: {}", e)))
	}

	async fn get_pool_balance(&self, account: Address) -> Result<U256, ChainError> {
		let data = IEthPool::balanceOfCall { account }.abi_encode();
		let result = self.call(self.eth_pool, None, data).await?;

		let decoded = IEthPool::balanceOfCall::abi_decode_returns(&result, true)
			.map_err(|e| ChainError::Network(format!("Invalid balanceOf response: {}", e)))?;
		Ok(decoded._0)
	}

	async fn deposit_to_pool(&self, amount: U256) -> Result<TransactionHash, ChainError> {
		let data = IEthPool::depositCall {}.abi_encode();
		let request = TransactionRequest::default()
			.to(self.eth_pool)
			.input(data.into())
			.value(amount);

		let receipt = self.send(request).await?;
		if !receipt.success {
			return Err(ChainError::TransactionFailed(format!(
				"Pool deposit reverted: {}",
				receipt.hash
			)));
		}

		Ok(receipt.hash)
	}

	async fn approve_transfer(
		&self,
		spender: Address,
		token_id: U256,
	) -> Result<TransactionReceipt, ChainError> {
		let data = IErc721::approveCall {
			to: spender,
			tokenId: token_id,
		}
		.abi_encode();
		let request = TransactionRequest::default().to(self.nft).input(data.into());

		let receipt = self.send(request).await?;
		if !receipt.success {
			return Err(ChainError::TransactionFailed(format!(
				"Transfer approval reverted: {}",
				receipt.hash
			)));
		}

		Ok(receipt)
	}

	async fn approve_payment(
		&self,
		spender: Address,
		amount: U256,
	) -> Result<TransactionReceipt, ChainError> {
		let data = IEthPool::approveCall { spender, amount }.abi_encode();
		let request = TransactionRequest::default()
			.to(self.eth_pool)
			.input(data.into());

		let receipt = self.send(request).await?;
		if !receipt.success {
			return Err(ChainError::TransactionFailed(format!(
				"Payment approval reverted: {}",
				receipt.hash
			)));
		}

		Ok(receipt)
	}

	async fn submit_bid(&self, bid: &SignedOrder) -> Result<TransactionReceipt, ChainError> {
		let data = IExchange::submitBidCall {
			bid: to_sol_input(bid),
		}
		.abi_encode();
		let request = TransactionRequest::default()
			.to(self.exchange)
			.input(data.into());

		let receipt = self.send(request).await?;
		if !receipt.success {
			return Err(ChainError::TransactionFailed(format!(
				"Bid submission reverted: {}",
				receipt.hash
			)));
		}

		Ok(receipt)
	}

	async fn execute_match(
		&self,
		sell: &SignedOrder,
		buy: &SignedOrder,
		value: U256,
	) -> Result<TransactionReceipt, ChainError> {
		let data = IExchange::executeCall {
			sell: to_sol_input(sell),
			buy: to_sol_input(buy),
		}
		.abi_encode();
		let request = TransactionRequest::default()
			.to(self.exchange)
			.input(data.into())
			.value(value);

		let receipt = self.send(request).await?;
		if !receipt.success {
			return Err(ChainError::TransactionFailed(format!(
				"Order matching reverted: {}",
				receipt.hash
			)));
		}

		Ok(receipt)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderflow_types::{AssetType, Order as FlowOrder, OrderSide};

	fn sample_signed_order() -> SignedOrder {
		SignedOrder {
			order: FlowOrder {
				trader: Address::repeat_byte(0x01),
				side: OrderSide::Sell,
				matching_policy: Address::repeat_byte(0x02),
				nft_contract: Address::repeat_byte(0x03),
				token_id: U256::from(7),
				asset_type: AssetType::Erc721,
				amount: U256::from(1),
				payment_token: Address::ZERO,
				price: U256::from(1_000_000u64),
				valid_until: U256::from(1_700_003_600u64),
				create_at: U256::from(1_700_000_000u64),
				fees: vec![],
				extra_params: orderflow_types::Bytes::new(),
				nonce: U256::ZERO,
			},
			v: 27,
			r: orderflow_types::B256::repeat_byte(0x11),
			s: orderflow_types::B256::repeat_byte(0x22),
			block_number: 42,
			signature_version: 0,
			extra_signature: orderflow_types::Bytes::new(),
		}
	}

	#[test]
	fn test_signed_order_maps_to_execute_input() {
		let signed = sample_signed_order();
		let input = to_sol_input(&signed);

		assert_eq!(input.order.side, 0);
		assert_eq!(input.order.assetType, 0);
		assert_eq!(input.v, 27);
		assert_eq!(input.blockNumber, U256::from(42));
		assert_eq!(input.signatureVersion, 0);
	}

	#[test]
	fn test_execute_calldata_carries_both_orders() {
		let signed = sample_signed_order();
		let data = IExchange::executeCall {
			sell: to_sol_input(&signed),
			buy: to_sol_input(&signed),
		}
		.abi_encode();

		// 4-byte selector followed by word-aligned ABI payload.
		assert_eq!(data.len() % 32, 4);
		assert!(data.len() > 4);
	}
}
