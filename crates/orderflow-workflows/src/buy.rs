//! The buy-order workflow: purchasing a listed NFT.
//!
//! IDLE → CHECKING_FUNDS → VALIDATING → GETTING_TIME → GETTING_NONCE →
//! CREATING_MESSAGE → SIGNING → BUILDING_ORDER → SUCCESS. The funds check
//! runs first so a buyer who can afford neither path (native balance nor
//! pool balance) fails before any chain-time work happens. On SUCCESS,
//! when a counterpart signed sell order was supplied, the workflow
//! executes on-chain matching; a matching failure is recorded without
//! leaving SUCCESS.

use crate::capabilities::{fetch_chain_time, require, time_outcome, Capabilities};
use futures::FutureExt;
use orderflow_account::AccountError;
use orderflow_engine::{
	DefinitionError, Machine, MachineError, StepAction, StepDescriptor, StepError,
	WorkflowDefinition,
};
use orderflow_storage::StorageKey;
use orderflow_types::{
	Address, AssetType, Bytes, ChainTime, MatchResult, Order, OrderSide, PrimaryType, Signature,
	SignedOrder, StepOutcome, TypedMessage, U256,
};
use std::fmt;
use std::sync::Arc;

/// States of the buy-order workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuyState {
	Idle,
	CheckingFunds,
	Validating,
	GettingTime,
	GettingNonce,
	CreatingMessage,
	Signing,
	BuildingOrder,
	Success,
	Error,
}

impl fmt::Display for BuyState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			BuyState::Idle => "IDLE",
			BuyState::CheckingFunds => "CHECKING_FUNDS",
			BuyState::Validating => "VALIDATING",
			BuyState::GettingTime => "GETTING_TIME",
			BuyState::GettingNonce => "GETTING_NONCE",
			BuyState::CreatingMessage => "CREATING_MESSAGE",
			BuyState::Signing => "SIGNING",
			BuyState::BuildingOrder => "BUILDING_ORDER",
			BuyState::Success => "SUCCESS",
			BuyState::Error => "ERROR",
		};
		write!(f, "{}", name)
	}
}

/// Inputs seeded when the workflow starts.
#[derive(Debug, Clone)]
pub struct BuyOrderParams {
	/// The NFT collection contract.
	pub nft_contract: Address,
	/// The token being bought.
	pub token_id: U256,
	/// Purchase price in wei.
	pub price: U256,
	/// The seller's signed order, when matching should run on success.
	pub counterpart_sell: Option<SignedOrder>,
}

/// Accumulated state of one buy-order run.
#[derive(Debug, Clone, Default)]
pub struct BuyContext {
	pub nft_contract: Option<Address>,
	pub token_id: Option<U256>,
	pub price: Option<U256>,
	pub counterpart_sell: Option<SignedOrder>,
	pub native_balance: Option<U256>,
	pub pool_balance: Option<U256>,
	pub chain_time: Option<ChainTime>,
	pub valid_until: Option<U256>,
	pub create_at: Option<U256>,
	pub nonce: Option<U256>,
	pub typed_message: Option<TypedMessage>,
	pub signature: Option<Signature>,
	pub signed_order: Option<SignedOrder>,
	pub match_result: Option<MatchResult>,
	pub matching_error: Option<String>,
	pub error_message: Option<String>,
}

fn checking_funds(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
		let caps = caps.clone();
		async move {
			let price = require(&context.price, "price")?;
			let trader = caps.trader_address().await?;

			let native_balance = caps
				.chain
				.get_native_balance(caps.chain_id(), trader)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			let pool_balance = caps
				.chain
				.get_pool_balance(caps.chain_id(), trader)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;

			if native_balance < price && pool_balance < price {
				return Err(StepError::InsufficientFunds {
					available: native_balance.max(pool_balance),
					required: price,
				});
			}

			Ok(StepOutcome::FundsChecked {
				native_balance,
				pool_balance,
			})
		}
		.boxed()
	})
}

fn validating(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
		let caps = caps.clone();
		async move {
			if context.nft_contract.is_none()
				|| context.token_id.is_none()
				|| context.price.is_none()
			{
				return Err(StepError::Validation(
					"wallet, network or purchase parameters are invalid".to_string(),
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

fn getting_time(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |_context: BuyContext| {
		let caps = caps.clone();
		async move {
			let chain_time = fetch_chain_time(&caps).await?;
			Ok(time_outcome(chain_time, caps.config.order.validity_seconds))
		}
		.boxed()
	})
}

fn getting_nonce(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |_context: BuyContext| {
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

fn creating_message(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
		let caps = caps.clone();
		async move {
			let trader = caps.trader_address().await?;
			let order = Order {
				trader,
				side: OrderSide::Buy,
				matching_policy: caps.config.contracts.default_policy,
				nft_contract: require(&context.nft_contract, "NFT contract")?,
				token_id: require(&context.token_id, "token id")?,
				asset_type: AssetType::Erc721,
				amount: U256::from(1),
				payment_token: Address::ZERO,
				price: require(&context.price, "price")?,
				valid_until: require(&context.valid_until, "validity deadline")?,
				create_at: require(&context.create_at, "creation time")?,
				fees: vec![],
				extra_params: Bytes::new(),
				nonce: require(&context.nonce, "nonce")?,
			};
			let typed_message = TypedMessage::marketplace(
				caps.chain_id(),
				caps.config.contracts.exchange,
				PrimaryType::Order,
				order,
			);
			Ok(StepOutcome::MessageCreated { typed_message })
		}
		.boxed()
	})
}

fn signing(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
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

fn building_order(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
		let caps = caps.clone();
		async move {
			let typed_message = require(&context.typed_message, "typed message")?;
			let signature = require(&context.signature, "signature")?;
			let chain_time = require(&context.chain_time, "chain time")?;

			let signed_order =
				SignedOrder::assemble(typed_message.order, &signature, chain_time.block_number);
			caps.storage
				.store(StorageKey::BuyOrder, &signed_order)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			tracing::info!(price = %signed_order.order.price, "Buy order built and cached");

			Ok(StepOutcome::OrderBuilt { signed_order })
		}
		.boxed()
	})
}

/// Terminal bookkeeping: match against the counterpart sell order when one
/// was supplied. Never fails the run.
fn finalizing(caps: Capabilities) -> StepAction<BuyContext> {
	Arc::new(move |context: BuyContext| {
		let caps = caps.clone();
		async move {
			let (sell, buy) = match (context.counterpart_sell, context.signed_order) {
				(Some(sell), Some(buy)) => (sell, buy),
				_ => {
					return Ok(StepOutcome::Finalized {
						match_result: None,
						matching_error: None,
					});
				}
			};

			// The exchange settles the purchase with the buy price sent
			// as transaction value.
			let value = buy.order.price;
			match caps
				.chain
				.execute_match(caps.chain_id(), &sell, &buy, value)
				.await
			{
				Ok(receipt) => {
					tracing::info!(tx_hash = %receipt.hash, "Order matching executed");
					Ok(StepOutcome::Finalized {
						match_result: Some(MatchResult {
							tx_hash: receipt.hash,
							confirmed: receipt.success,
						}),
						matching_error: None,
					})
				}
				Err(e) => {
					tracing::warn!(error = %e, "Order matching failed after purchase succeeded");
					Ok(StepOutcome::Finalized {
						match_result: None,
						matching_error: Some(e.to_string()),
					})
				}
			}
		}
		.boxed()
	})
}

fn resolve(state: BuyState, outcome: &StepOutcome) -> Option<BuyState> {
	match (state, outcome) {
		(BuyState::CheckingFunds, StepOutcome::FundsChecked { .. }) => Some(BuyState::Validating),
		(BuyState::Validating, StepOutcome::Validated) => Some(BuyState::GettingTime),
		(BuyState::GettingTime, StepOutcome::TimeFetched { .. }) => Some(BuyState::GettingNonce),
		(BuyState::GettingNonce, StepOutcome::NonceFetched { .. }) => {
			Some(BuyState::CreatingMessage)
		}
		(BuyState::CreatingMessage, StepOutcome::MessageCreated { .. }) => Some(BuyState::Signing),
		(BuyState::Signing, StepOutcome::Signed { .. }) => Some(BuyState::BuildingOrder),
		(BuyState::BuildingOrder, StepOutcome::OrderBuilt { .. }) => Some(BuyState::Success),
		_ => None,
	}
}

fn apply(context: &mut BuyContext, outcome: &StepOutcome) {
	match outcome {
		StepOutcome::FundsChecked {
			native_balance,
			pool_balance,
		} => {
			context.native_balance = Some(*native_balance);
			context.pool_balance = Some(*pool_balance);
		}
		StepOutcome::Validated => {}
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
		StepOutcome::OrderBuilt { signed_order } => {
			context.signed_order = Some(signed_order.clone());
		}
		StepOutcome::Finalized {
			match_result,
			matching_error,
		} => {
			context.match_result = match_result.clone();
			context.matching_error = matching_error.clone();
		}
		_ => {}
	}
}

fn definition(caps: Capabilities) -> Result<WorkflowDefinition<BuyState, BuyContext>, DefinitionError> {
	WorkflowDefinition::builder(
		"buy-order",
		BuyState::Idle,
		BuyState::CheckingFunds,
		BuyState::Success,
		BuyState::Error,
	)
	.register(BuyState::Idle, StepDescriptor::passive("Ready", 0))
	.register(
		BuyState::CheckingFunds,
		StepDescriptor::active("Checking funds...", 5, checking_funds(caps.clone())),
	)
	.register(
		BuyState::Validating,
		StepDescriptor::active("Validating wallet and network...", 10, validating(caps.clone())),
	)
	.register(
		BuyState::GettingTime,
		StepDescriptor::active("Getting chain time...", 20, getting_time(caps.clone()))
			.with_guard(Arc::new(|context: &BuyContext| {
				context.native_balance.is_some() && context.pool_balance.is_some()
			})),
	)
	.register(
		BuyState::GettingNonce,
		StepDescriptor::active("Getting order nonce...", 30, getting_nonce(caps.clone()))
			.with_guard(Arc::new(|context: &BuyContext| context.chain_time.is_some())),
	)
	.register(
		BuyState::CreatingMessage,
		StepDescriptor::active(
			"Creating order message...",
			40,
			creating_message(caps.clone()),
		)
		.with_guard(Arc::new(|context: &BuyContext| {
			context.nonce.is_some()
				&& context.valid_until.is_some()
				&& context.create_at.is_some()
		})),
	)
	.register(
		BuyState::Signing,
		StepDescriptor::active("Waiting for signature...", 50, signing(caps.clone())).with_guard(
			Arc::new(|context: &BuyContext| context.typed_message.is_some()),
		),
	)
	.register(
		BuyState::BuildingOrder,
		StepDescriptor::active("Building signed order...", 90, building_order(caps.clone())),
	)
	.register(
		BuyState::Success,
		StepDescriptor::active("Purchase completed", 100, finalizing(caps)),
	)
	.register(BuyState::Error, StepDescriptor::passive("Purchase failed", 0))
	.allow(BuyState::Idle, vec![BuyState::CheckingFunds])
	.allow(
		BuyState::CheckingFunds,
		vec![BuyState::Validating, BuyState::Error],
	)
	.allow(
		BuyState::Validating,
		vec![BuyState::GettingTime, BuyState::Error],
	)
	.allow(
		BuyState::GettingTime,
		vec![BuyState::GettingNonce, BuyState::Error],
	)
	.allow(
		BuyState::GettingNonce,
		vec![BuyState::CreatingMessage, BuyState::Error],
	)
	.allow(
		BuyState::CreatingMessage,
		vec![BuyState::Signing, BuyState::Error],
	)
	.allow(
		BuyState::Signing,
		vec![BuyState::BuildingOrder, BuyState::Error],
	)
	.allow(
		BuyState::BuildingOrder,
		vec![BuyState::Success, BuyState::Error],
	)
	.allow(BuyState::Success, vec![BuyState::Idle])
	.allow(BuyState::Error, vec![BuyState::Idle])
	.resolver(resolve)
	.applier(apply)
	.error_setter(|context: &mut BuyContext, message| {
		context.error_message = Some(message);
	})
	.build()
}

/// The buy-order workflow bound to its capability services.
#[derive(Clone)]
pub struct BuyOrderWorkflow {
	machine: Machine<BuyState, BuyContext>,
}

impl BuyOrderWorkflow {
	/// Builds the workflow. Fails if the definition is internally
	/// inconsistent.
	pub fn new(capabilities: Capabilities) -> Result<Self, DefinitionError> {
		Ok(Self {
			machine: Machine::new(Arc::new(definition(capabilities)?)),
		})
	}

	/// Runs the purchase to a terminal state.
	pub async fn start(&self, params: BuyOrderParams) -> Result<BuyState, MachineError> {
		self.machine
			.start_with(move |context| {
				context.nft_contract = Some(params.nft_contract);
				context.token_id = Some(params.token_id);
				context.price = Some(params.price);
				context.counterpart_sell = params.counterpart_sell;
			})
			.await
	}

	/// Supplies a signature collected through a UI side channel; the
	/// SIGNING step then skips the wallet prompt.
	pub fn supply_signature(&self, signature: Signature) {
		self.machine
			.with_context_mut(|context| context.signature = Some(signature));
	}

	/// Returns to IDLE with a cleared context.
	pub fn reset(&self) {
		self.machine.reset();
	}

	/// A snapshot of the run context.
	pub fn context(&self) -> BuyContext {
		self.machine.context()
	}

	/// The state the workflow currently rests in.
	pub fn current_state(&self) -> BuyState {
		self.machine.current_state()
	}

	/// Whether the workflow currently rests in `state`.
	pub fn is_in_state(&self, state: BuyState) -> bool {
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
