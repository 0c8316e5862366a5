//! The collection-bid workflow: bidding on any token of a collection,
//! funded from the escrow pool.
//!
//! IDLE → VALIDATING → CHECKING_BALANCE → (DEPOSITING_ETH →
//! RE_CHECKING_BALANCE)? → GETTING_TIME → GETTING_NONCE →
//! CREATING_BID_MESSAGE → SIGNING_BID → APPROVING_PAYMENT_TOKEN →
//! SUBMITTING_BID → SUCCESS. The deposit leg only runs when the pool
//! balance falls short of the bid, and deposits exactly the shortfall.
//! The signed bid targets token id zero under the pool matching policy
//! with primary type `CollectionOrder`, and is persisted under the
//! `collection-bid` storage key.

use crate::capabilities::{fetch_chain_time, require, time_outcome, Capabilities};
use futures::FutureExt;
use orderflow_account::AccountError;
use orderflow_engine::{
	DefinitionError, Machine, MachineError, StepAction, StepDescriptor, StepError,
	WorkflowDefinition,
};
use orderflow_storage::StorageKey;
use orderflow_types::{
	Address, AssetType, BalanceCheck, Bytes, ChainTime, Order, OrderSide, PrimaryType, Signature,
	SignedOrder, StepOutcome, TransactionHash, TypedMessage, U256,
};
use std::fmt;
use std::sync::Arc;

/// Extra params marking a collection-wide bid for the matching policy.
const COLLECTION_BID_EXTRA_PARAMS: [u8; 1] = [0x01];

/// States of the collection-bid workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidState {
	Idle,
	Validating,
	CheckingBalance,
	DepositingEth,
	ReCheckingBalance,
	GettingTime,
	GettingNonce,
	CreatingBidMessage,
	SigningBid,
	ApprovingPaymentToken,
	SubmittingBid,
	Success,
	Error,
}

impl fmt::Display for BidState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			BidState::Idle => "IDLE",
			BidState::Validating => "VALIDATING",
			BidState::CheckingBalance => "CHECKING_BALANCE",
			BidState::DepositingEth => "DEPOSITING_ETH",
			BidState::ReCheckingBalance => "RE_CHECKING_BALANCE",
			BidState::GettingTime => "GETTING_TIME",
			BidState::GettingNonce => "GETTING_NONCE",
			BidState::CreatingBidMessage => "CREATING_BID_MESSAGE",
			BidState::SigningBid => "SIGNING_BID",
			BidState::ApprovingPaymentToken => "APPROVING_PAYMENT_TOKEN",
			BidState::SubmittingBid => "SUBMITTING_BID",
			BidState::Success => "SUCCESS",
			BidState::Error => "ERROR",
		};
		write!(f, "{}", name)
	}
}

/// Inputs seeded when the workflow starts.
#[derive(Debug, Clone)]
pub struct BidParams {
	/// The collection being bid on.
	pub collection: Address,
	/// Bid amount in wei.
	pub bid_price: U256,
}

/// Accumulated state of one collection-bid run.
#[derive(Debug, Clone, Default)]
pub struct BidContext {
	pub collection: Option<Address>,
	pub bid_price: Option<U256>,
	pub pool_balance: Option<U256>,
	pub needs_deposit: Option<bool>,
	pub required_deposit: Option<U256>,
	pub deposit_tx: Option<TransactionHash>,
	pub chain_time: Option<ChainTime>,
	pub valid_until: Option<U256>,
	pub create_at: Option<U256>,
	pub nonce: Option<U256>,
	pub typed_message: Option<TypedMessage>,
	pub signature: Option<Signature>,
	pub approval_tx: Option<TransactionHash>,
	pub submission_tx: Option<TransactionHash>,
	pub error_message: Option<String>,
}

fn validating(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			if context.collection.is_none() || context.bid_price.is_none() {
				return Err(StepError::Validation(
					"wallet, network or collection address is invalid".to_string(),
				));
			}
			if !caps.chain.supports(caps.chain_id()) {
				return Err(StepError::Validation(format!(
					"chain {} is not configured",
					caps.chain_id()
				)));
			}
			caps.trader_address().await?;
			Ok(StepOutcome::Validated)
		}
		.boxed()
	})
}

fn checking_balance(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let bid_price = require(&context.bid_price, "bid price")?;
			let trader = caps.trader_address().await?;
			let balance = caps
				.chain
				.get_pool_balance(caps.chain_id(), trader)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;

			let check = BalanceCheck::evaluate(balance, bid_price);
			Ok(StepOutcome::BalanceChecked {
				balance,
				needs_deposit: check.needs_deposit,
				required_deposit: check.required_deposit,
			})
		}
		.boxed()
	})
}

fn depositing(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let amount = require(&context.required_deposit, "deposit amount")?;
			let tx_hash = caps
				.chain
				.deposit_to_pool(caps.chain_id(), amount)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			tracing::info!(amount = %amount, tx_hash = %tx_hash, "Deposited shortfall into pool");
			Ok(StepOutcome::Deposited { amount, tx_hash })
		}
		.boxed()
	})
}

fn rechecking_balance(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let bid_price = require(&context.bid_price, "bid price")?;
			let trader = caps.trader_address().await?;
			let balance = caps
				.chain
				.get_pool_balance(caps.chain_id(), trader)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;

			if balance < bid_price {
				return Err(StepError::InsufficientFunds {
					available: balance,
					required: bid_price,
				});
			}
			Ok(StepOutcome::BalanceConfirmed { balance })
		}
		.boxed()
	})
}

fn getting_time(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |_context: BidContext| {
		let caps = caps.clone();
		async move {
			let chain_time = fetch_chain_time(&caps).await?;
			Ok(time_outcome(chain_time, caps.config.order.validity_seconds))
		}
		.boxed()
	})
}

fn getting_nonce(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |_context: BidContext| {
		let caps = caps.clone();
		async move {
			let trader = caps.trader_address().await?;
			let nonce = caps
				.chain
				.get_order_nonce(caps.chain_id(), trader)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			Ok(StepOutcome::NonceFetched { nonce })
		}
		.boxed()
	})
}

fn creating_bid_message(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let trader = caps.trader_address().await?;
			let order = Order {
				trader,
				side: OrderSide::Buy,
				matching_policy: caps.config.contracts.pool_policy,
				nft_contract: require(&context.collection, "collection address")?,
				// Collection-wide: no specific token.
				token_id: U256::ZERO,
				asset_type: AssetType::Erc721,
				amount: U256::from(1),
				payment_token: caps.config.contracts.eth_pool,
				price: require(&context.bid_price, "bid price")?,
				valid_until: require(&context.valid_until, "validity deadline")?,
				create_at: require(&context.create_at, "creation time")?,
				fees: vec![],
				extra_params: Bytes::from_static(&COLLECTION_BID_EXTRA_PARAMS),
				nonce: require(&context.nonce, "nonce")?,
			};
			let typed_message = TypedMessage::marketplace(
				caps.chain_id(),
				caps.config.contracts.exchange,
				PrimaryType::CollectionOrder,
				order,
			);
			Ok(StepOutcome::MessageCreated { typed_message })
		}
		.boxed()
	})
}

fn signing_bid(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			if let Some(signature) = context.signature {
				return Ok(StepOutcome::Signed { signature });
			}
			let typed_message = require(&context.typed_message, "typed message")?;
			let signature = caps
				.account
				.sign_typed_data(&typed_message)
				.await
				.map_err(|e| match e {
					AccountError::Rejected(reason) => StepError::SignatureRejected(reason),
					other => StepError::Capability(other.to_string()),
				})?;
			Ok(StepOutcome::Signed { signature })
		}
		.boxed()
	})
}

fn approving_payment(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let bid_price = require(&context.bid_price, "bid price")?;
			let receipt = caps
				.chain
				.approve_payment(caps.chain_id(), caps.config.contracts.exchange, bid_price)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			Ok(StepOutcome::Approved {
				tx_hash: receipt.hash,
			})
		}
		.boxed()
	})
}

fn submitting_bid(caps: Capabilities) -> StepAction<BidContext> {
	Arc::new(move |context: BidContext| {
		let caps = caps.clone();
		async move {
			let typed_message = require(&context.typed_message, "typed message")?;
			let signature = require(&context.signature, "signature")?;
			let chain_time = require(&context.chain_time, "chain time")?;

			let signed_bid =
				SignedOrder::assemble(typed_message.order, &signature, chain_time.block_number);
			caps.storage
				.store(StorageKey::CollectionBid, &signed_bid)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;

			let receipt = caps
				.chain
				.submit_bid(caps.chain_id(), &signed_bid)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			tracing::info!(tx_hash = %receipt.hash, "Collection bid submitted");

			Ok(StepOutcome::Submitted {
				tx_hash: receipt.hash,
			})
		}
		.boxed()
	})
}

fn resolve(state: BidState, outcome: &StepOutcome) -> Option<BidState> {
	match (state, outcome) {
		(BidState::Validating, StepOutcome::Validated) => Some(BidState::CheckingBalance),
		(
			BidState::CheckingBalance,
			StepOutcome::BalanceChecked {
				needs_deposit: true,
				..
			},
		) => Some(BidState::DepositingEth),
		(
			BidState::CheckingBalance,
			StepOutcome::BalanceChecked {
				needs_deposit: false,
				..
			},
		) => Some(BidState::GettingTime),
		(BidState::DepositingEth, StepOutcome::Deposited { .. }) => {
			Some(BidState::ReCheckingBalance)
		}
		(BidState::ReCheckingBalance, StepOutcome::BalanceConfirmed { .. }) => {
			Some(BidState::GettingTime)
		}
		(BidState::GettingTime, StepOutcome::TimeFetched { .. }) => Some(BidState::GettingNonce),
		(BidState::GettingNonce, StepOutcome::NonceFetched { .. }) => {
			Some(BidState::CreatingBidMessage)
		}
		(BidState::CreatingBidMessage, StepOutcome::MessageCreated { .. }) => {
			Some(BidState::SigningBid)
		}
		(BidState::SigningBid, StepOutcome::Signed { .. }) => Some(BidState::ApprovingPaymentToken),
		(BidState::ApprovingPaymentToken, StepOutcome::Approved { .. }) => {
			Some(BidState::SubmittingBid)
		}
		(BidState::SubmittingBid, StepOutcome::Submitted { .. }) => Some(BidState::Success),
		_ => None,
	}
}

fn apply(context: &mut BidContext, outcome: &StepOutcome) {
	match outcome {
		StepOutcome::Validated => {}
		StepOutcome::BalanceChecked {
			balance,
			needs_deposit,
			required_deposit,
		} => {
			context.pool_balance = Some(*balance);
			context.needs_deposit = Some(*needs_deposit);
			context.required_deposit = Some(*required_deposit);
		}
		StepOutcome::Deposited { tx_hash, .. } => {
			context.deposit_tx = Some(tx_hash.clone());
		}
		StepOutcome::BalanceConfirmed { balance } => {
			context.pool_balance = Some(*balance);
			context.needs_deposit = Some(false);
		}
		StepOutcome::TimeFetched {
			chain_time,
			valid_until,
			create_at,
		} => {
			context.chain_time = Some(*chain_time);
			context.valid_until = Some(*valid_until);
			context.create_at = Some(*create_at);
		}
		StepOutcome::NonceFetched { nonce } => context.nonce = Some(*nonce),
		StepOutcome::MessageCreated { typed_message } => {
			context.typed_message = Some(typed_message.clone());
		}
		StepOutcome::Signed { signature } => context.signature = Some(signature.clone()),
		StepOutcome::Approved { tx_hash } => context.approval_tx = Some(tx_hash.clone()),
		StepOutcome::Submitted { tx_hash } => context.submission_tx = Some(tx_hash.clone()),
		_ => {}
	}
}

fn definition(caps: Capabilities) -> Result<WorkflowDefinition<BidState, BidContext>, DefinitionError> {
	WorkflowDefinition::builder(
		"collection-bid",
		BidState::Idle,
		BidState::Validating,
		BidState::Success,
		BidState::Error,
	)
	.register(BidState::Idle, StepDescriptor::passive("Ready", 0))
	.register(
		BidState::Validating,
		StepDescriptor::active("Validating wallet and network...", 10, validating(caps.clone())),
	)
	.register(
		BidState::CheckingBalance,
		StepDescriptor::active("Checking pool balance...", 20, checking_balance(caps.clone()))
			.with_guard(Arc::new(|context: &BidContext| {
				context.collection.is_some() && context.bid_price.is_some()
			})),
	)
	.register(
		BidState::DepositingEth,
		StepDescriptor::active("Depositing ETH into pool...", 25, depositing(caps.clone()))
			.with_guard(Arc::new(|context: &BidContext| {
				context.needs_deposit == Some(true)
			})),
	)
	.register(
		BidState::ReCheckingBalance,
		StepDescriptor::active(
			"Re-checking pool balance...",
			30,
			rechecking_balance(caps.clone()),
		)
		.with_guard(Arc::new(|context: &BidContext| {
			context.deposit_tx.is_some()
		})),
	)
	.register(
		BidState::GettingTime,
		StepDescriptor::active("Getting chain time...", 30, getting_time(caps.clone()))
			.with_guard(Arc::new(|context: &BidContext| {
				// A zero pool balance read is a value; only an unread
				// balance blocks the transition.
				context.pool_balance.is_some()
			})),
	)
	.register(
		BidState::GettingNonce,
		StepDescriptor::active("Getting order nonce...", 40, getting_nonce(caps.clone()))
			.with_guard(Arc::new(|context: &BidContext| context.chain_time.is_some())),
	)
	.register(
		BidState::CreatingBidMessage,
		StepDescriptor::active(
			"Creating bid message...",
			50,
			creating_bid_message(caps.clone()),
		)
		.with_guard(Arc::new(|context: &BidContext| {
			context.nonce.is_some()
				&& context.valid_until.is_some()
				&& context.create_at.is_some()
		})),
	)
	.register(
		BidState::SigningBid,
		StepDescriptor::active("Waiting for signature...", 60, signing_bid(caps.clone()))
			.with_guard(Arc::new(|context: &BidContext| {
				context.typed_message.is_some()
			})),
	)
	.register(
		BidState::ApprovingPaymentToken,
		StepDescriptor::active(
			"Approving payment token...",
			70,
			approving_payment(caps.clone()),
		)
		.with_guard(Arc::new(|context: &BidContext| context.signature.is_some())),
	)
	.register(
		BidState::SubmittingBid,
		StepDescriptor::active("Submitting bid...", 90, submitting_bid(caps))
			.with_guard(Arc::new(|context: &BidContext| context.signature.is_some())),
	)
	.register(BidState::Success, StepDescriptor::passive("Bid placed", 100))
	.register(BidState::Error, StepDescriptor::passive("Bid failed", 0))
	.allow(BidState::Idle, vec![BidState::Validating])
	.allow(
		BidState::Validating,
		vec![BidState::CheckingBalance, BidState::Error],
	)
	.allow(
		BidState::CheckingBalance,
		vec![BidState::DepositingEth, BidState::GettingTime, BidState::Error],
	)
	.allow(
		BidState::DepositingEth,
		vec![BidState::ReCheckingBalance, BidState::Error],
	)
	.allow(
		BidState::ReCheckingBalance,
		vec![BidState::GettingTime, BidState::Error],
	)
	.allow(
		BidState::GettingTime,
		vec![BidState::GettingNonce, BidState::Error],
	)
	.allow(
		BidState::GettingNonce,
		vec![BidState::CreatingBidMessage, BidState::Error],
	)
	.allow(
		BidState::CreatingBidMessage,
		vec![BidState::SigningBid, BidState::Error],
	)
	.allow(
		BidState::SigningBid,
		vec![BidState::ApprovingPaymentToken, BidState::Error],
	)
	.allow(
		BidState::ApprovingPaymentToken,
		vec![BidState::SubmittingBid, BidState::Error],
	)
	.allow(
		BidState::SubmittingBid,
		vec![BidState::Success, BidState::Error],
	)
	.allow(BidState::Success, vec![BidState::Idle])
	.allow(BidState::Error, vec![BidState::Idle])
	.resolver(resolve)
	.applier(apply)
	.error_setter(|context: &mut BidContext, message| {
		context.error_message = Some(message);
	})
	.build()
}

/// The collection-bid workflow bound to its capability services.
#[derive(Clone)]
pub struct CollectionBidWorkflow {
	machine: Machine<BidState, BidContext>,
}

impl CollectionBidWorkflow {
	/// Builds the workflow. Fails if the definition is internally
	/// inconsistent.
	pub fn new(capabilities: Capabilities) -> Result<Self, DefinitionError> {
		Ok(Self {
			machine: Machine::new(Arc::new(definition(capabilities)?)),
		})
	}

	/// Runs the bid to a terminal state.
	pub async fn start(&self, params: BidParams) -> Result<BidState, MachineError> {
		self.machine
			.start_with(move |context| {
				context.collection = Some(params.collection);
				context.bid_price = Some(params.bid_price);
			})
			.await
	}

	/// Supplies a signature collected through a UI side channel; the
	/// SIGNING_BID step then skips the wallet prompt.
	pub fn supply_signature(&self, signature: Signature) {
		self.machine
			.with_context_mut(|context| context.signature = Some(signature));
	}

	/// Returns to IDLE with a cleared context.
	pub fn reset(&self) {
		self.machine.reset();
	}

	/// A snapshot of the run context.
	pub fn context(&self) -> BidContext {
		self.machine.context()
	}

	/// The state the workflow currently rests in.
	pub fn current_state(&self) -> BidState {
		self.machine.current_state()
	}

	/// Whether the workflow currently rests in `state`.
	pub fn is_in_state(&self, state: BidState) -> bool {
		self.machine.is_in_state(state)
	}

	/// Progress percentage of the current state.
	pub fn progress(&self) -> u8 {
		self.machine.progress()
	}

	/// User-facing label of the current state.
	pub fn current_step_label(&self) -> &'static str {
		self.machine.current_step_label()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::capabilities_with_mock;
	use orderflow_chain::implementations::mock::MockChain;

	fn params(bid_price: U256) -> BidParams {
		BidParams {
			collection: Address::repeat_byte(0x33),
			bid_price,
		}
	}

	#[tokio::test]
	async fn test_sufficient_pool_balance_skips_the_deposit_leg() {
		let mock = MockChain::new()
			.with_block(100, 1_700_000_000)
			.with_pool_balance(U256::from(10));
		let caps = capabilities_with_mock(mock.clone());
		let workflow = CollectionBidWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::from(10))).await.unwrap();

		assert_eq!(terminal, BidState::Success);
		assert!(mock.deposits().is_empty());
		assert!(workflow.context().deposit_tx.is_none());
	}

	#[tokio::test]
	async fn test_shortfall_is_deposited_exactly() {
		let mock = MockChain::new()
			.with_block(100, 1_700_000_000)
			.with_nonce(U256::from(7))
			.with_pool_balance(U256::from(3));
		let caps = capabilities_with_mock(mock.clone());
		let workflow = CollectionBidWorkflow::new(caps.clone()).unwrap();

		let terminal = workflow.start(params(U256::from(10))).await.unwrap();

		assert_eq!(terminal, BidState::Success);
		assert_eq!(workflow.progress(), 100);
		assert_eq!(mock.deposits(), vec![U256::from(7)]);

		// Pool approval covers the full bid, and the bid went on chain.
		let payment_approvals = mock.payment_approvals();
		assert_eq!(payment_approvals.len(), 1);
		assert_eq!(payment_approvals[0].1, U256::from(10));
		assert_eq!(mock.submitted_bids().len(), 1);

		let cached: SignedOrder = caps
			.storage
			.retrieve(StorageKey::CollectionBid)
			.await
			.unwrap();
		assert_eq!(cached.order.price, U256::from(10));
		assert_eq!(cached.order.nonce, U256::from(7));
	}

	#[tokio::test]
	async fn test_insufficient_balance_after_deposit_fails_the_bid() {
		let mock = MockChain::new()
			.with_block(100, 1_700_000_000)
			.with_pool_balance(U256::from(3))
			.with_noop_deposit();
		let caps = capabilities_with_mock(mock.clone());
		let workflow = CollectionBidWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::from(10))).await.unwrap();

		assert_eq!(terminal, BidState::Error);
		assert_eq!(mock.deposits(), vec![U256::from(7)]);
		let message = workflow.context().error_message.unwrap();
		assert!(message.contains("Insufficient funds"));
		assert!(mock.submitted_bids().is_empty());
	}

	#[tokio::test]
	async fn test_bid_message_is_collection_wide() {
		let mock = MockChain::new()
			.with_block(100, 1_700_000_000)
			.with_pool_balance(U256::from(10));
		let caps = capabilities_with_mock(mock.clone());
		let workflow = CollectionBidWorkflow::new(caps.clone()).unwrap();

		workflow.start(params(U256::from(10))).await.unwrap();

		let message = workflow.context().typed_message.unwrap();
		assert_eq!(message.primary_type, PrimaryType::CollectionOrder);
		assert_eq!(message.order.token_id, U256::ZERO);
		assert_eq!(message.order.side, OrderSide::Buy);
		assert_eq!(
			message.order.matching_policy,
			caps.config.contracts.pool_policy
		);
		assert_eq!(
			message.order.payment_token,
			caps.config.contracts.eth_pool
		);
		assert_eq!(message.order.extra_params.as_ref(), &[0x01]);

		let submitted = mock.submitted_bids();
		assert_eq!(submitted[0].order.nft_contract, Address::repeat_byte(0x33));
	}

	#[tokio::test]
	async fn test_zero_pool_balance_deposits_the_full_bid() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_mock(mock.clone());
		let workflow = CollectionBidWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::from(4))).await.unwrap();

		assert_eq!(terminal, BidState::Success);
		assert_eq!(mock.deposits(), vec![U256::from(4)]);
	}
}
