//! The sell-order workflow: listing an NFT for sale.
//!
//! IDLE → VALIDATING → GETTING_TIME → GETTING_NONCE → CREATING_MESSAGE →
//! SIGNING → APPROVING_NFT → BUILDING_ORDER → SUCCESS, with ERROR
//! reachable from every transient state. The built payload is persisted
//! under the `sell-order` storage key.

use crate::capabilities::{fetch_chain_time, require, time_outcome, Capabilities};
use futures::FutureExt;
use orderflow_account::AccountError;
use orderflow_engine::{
	DefinitionError, Machine, MachineError, StepAction, StepDescriptor, StepError,
	WorkflowDefinition,
};
use orderflow_storage::StorageKey;
use orderflow_types::{
	Address, AssetType, Bytes, ChainTime, Order, OrderSide, PrimaryType, Signature, SignedOrder,
	StepOutcome, TransactionHash, TypedMessage, U256,
};
use std::fmt;
use std::sync::Arc;

/// States of the sell-order workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SellState {
	Idle,
	Validating,
	GettingTime,
	GettingNonce,
	CreatingMessage,
	Signing,
	ApprovingNft,
	BuildingOrder,
	Success,
	Error,
}

impl fmt::Display for SellState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SellState::Idle => "IDLE",
			SellState::Validating => "VALIDATING",
			SellState::GettingTime => "GETTING_TIME",
			SellState::GettingNonce => "GETTING_NONCE",
			SellState::CreatingMessage => "CREATING_MESSAGE",
			SellState::Signing => "SIGNING",
			SellState::ApprovingNft => "APPROVING_NFT",
			SellState::BuildingOrder => "BUILDING_ORDER",
			SellState::Success => "SUCCESS",
			SellState::Error => "ERROR",
		};
		write!(f, "{}", name)
	}
}

/// Inputs seeded when the workflow starts.
#[derive(Debug, Clone)]
pub struct SellOrderParams {
	/// The NFT collection contract.
	pub nft_contract: Address,
	/// The token being listed.
	pub token_id: U256,
	/// Asking price in wei. Zero is a valid price.
	pub price: U256,
}

/// Accumulated state of one sell-order run.
///
/// Every field an action produces is `Option`, so a zero value (nonce 0,
/// price 0 wei) is distinguishable from a value not yet fetched.
#[derive(Debug, Clone, Default)]
pub struct SellContext {
	pub nft_contract: Option<Address>,
	pub token_id: Option<U256>,
	pub price: Option<U256>,
	pub chain_time: Option<ChainTime>,
	pub valid_until: Option<U256>,
	pub create_at: Option<U256>,
	pub nonce: Option<U256>,
	pub typed_message: Option<TypedMessage>,
	pub signature: Option<Signature>,
	pub approval_tx: Option<TransactionHash>,
	pub signed_order: Option<SignedOrder>,
	pub error_message: Option<String>,
}

fn validating(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |context: SellContext| {
		let caps = caps.clone();
		async move {
			if context.nft_contract.is_none()
				|| context.token_id.is_none()
				|| context.price.is_none()
			{
				return Err(StepError::Validation(
					"wallet, network or listing parameters are invalid".to_string(),
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

fn getting_time(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |_context: SellContext| {
		let caps = caps.clone();
		async move {
			let chain_time = fetch_chain_time(&caps).await?;
			Ok(time_outcome(chain_time, caps.config.order.validity_seconds))
		}
		.boxed()
	})
}

fn getting_nonce(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |_context: SellContext| {
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

fn creating_message(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |context: SellContext| {
		let caps = caps.clone();
		async move {
			let trader = caps.trader_address().await?;
			let order = Order {
				trader,
				side: OrderSide::Sell,
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

fn signing(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |context: SellContext| {
		let caps = caps.clone();
		async move {
			// A signature supplied through the out-of-band setter wins
			// over prompting the wallet again.
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

fn approving_nft(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |context: SellContext| {
		let caps = caps.clone();
		async move {
			let token_id = require(&context.token_id, "token id")?;
			let receipt = caps
				.chain
				.approve_transfer(
					caps.chain_id(),
					caps.config.contracts.transfer_manager,
					token_id,
				)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			Ok(StepOutcome::Approved {
				tx_hash: receipt.hash,
			})
		}
		.boxed()
	})
}

fn building_order(caps: Capabilities) -> StepAction<SellContext> {
	Arc::new(move |context: SellContext| {
		let caps = caps.clone();
		async move {
			let typed_message = require(&context.typed_message, "typed message")?;
			let signature = require(&context.signature, "signature")?;
			let chain_time = require(&context.chain_time, "chain time")?;

			let signed_order =
				SignedOrder::assemble(typed_message.order, &signature, chain_time.block_number);
			caps.storage
				.store(StorageKey::SellOrder, &signed_order)
				.await
				.map_err(|e| StepError::Capability(e.to_string()))?;
			tracing::info!(price = %signed_order.order.price, "Sell order built and cached");

			Ok(StepOutcome::OrderBuilt { signed_order })
		}
		.boxed()
	})
}

fn resolve(state: SellState, outcome: &StepOutcome) -> Option<SellState> {
	match (state, outcome) {
		(SellState::Validating, StepOutcome::Validated) => Some(SellState::GettingTime),
		(SellState::GettingTime, StepOutcome::TimeFetched { .. }) => Some(SellState::GettingNonce),
		(SellState::GettingNonce, StepOutcome::NonceFetched { .. }) => {
			Some(SellState::CreatingMessage)
		}
		(SellState::CreatingMessage, StepOutcome::MessageCreated { .. }) => {
			Some(SellState::Signing)
		}
		(SellState::Signing, StepOutcome::Signed { .. }) => Some(SellState::ApprovingNft),
		(SellState::ApprovingNft, StepOutcome::Approved { .. }) => Some(SellState::BuildingOrder),
		(SellState::BuildingOrder, StepOutcome::OrderBuilt { .. }) => Some(SellState::Success),
		_ => None,
	}
}

fn apply(context: &mut SellContext, outcome: &StepOutcome) {
	match outcome {
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
		StepOutcome::Approved { tx_hash } => context.approval_tx = Some(tx_hash.clone()),
		StepOutcome::OrderBuilt { signed_order } => {
			context.signed_order = Some(signed_order.clone());
		}
		_ => {}
	}
}

fn definition(caps: Capabilities) -> Result<WorkflowDefinition<SellState, SellContext>, DefinitionError> {
	WorkflowDefinition::builder(
		"sell-order",
		SellState::Idle,
		SellState::Validating,
		SellState::Success,
		SellState::Error,
	)
	.register(SellState::Idle, StepDescriptor::passive("Ready", 0))
	.register(
		SellState::Validating,
		StepDescriptor::active("Validating wallet and network...", 10, validating(caps.clone())),
	)
	.register(
		SellState::GettingTime,
		StepDescriptor::active("Getting chain time...", 20, getting_time(caps.clone()))
			.with_guard(Arc::new(|context: &SellContext| {
				context.nft_contract.is_some()
					&& context.token_id.is_some()
					&& context.price.is_some()
			})),
	)
	.register(
		SellState::GettingNonce,
		StepDescriptor::active("Getting order nonce...", 30, getting_nonce(caps.clone()))
			.with_guard(Arc::new(|context: &SellContext| {
				context.chain_time.is_some()
			})),
	)
	.register(
		SellState::CreatingMessage,
		StepDescriptor::active(
			"Creating order message...",
			40,
			creating_message(caps.clone()),
		)
		.with_guard(Arc::new(|context: &SellContext| {
			context.nonce.is_some()
				&& context.valid_until.is_some()
				&& context.create_at.is_some()
		})),
	)
	.register(
		SellState::Signing,
		StepDescriptor::active("Waiting for signature...", 50, signing(caps.clone())).with_guard(
			Arc::new(|context: &SellContext| context.typed_message.is_some()),
		),
	)
	.register(
		SellState::ApprovingNft,
		StepDescriptor::active("Approving NFT transfer...", 70, approving_nft(caps.clone()))
			.with_guard(Arc::new(|context: &SellContext| {
				context.signature.is_some()
			})),
	)
	.register(
		SellState::BuildingOrder,
		StepDescriptor::active("Building signed order...", 90, building_order(caps)),
	)
	.register(SellState::Success, StepDescriptor::passive("Listing created", 100))
	.register(SellState::Error, StepDescriptor::passive("Listing failed", 0))
	.allow(SellState::Idle, vec![SellState::Validating])
	.allow(
		SellState::Validating,
		vec![SellState::GettingTime, SellState::Error],
	)
	.allow(
		SellState::GettingTime,
		vec![SellState::GettingNonce, SellState::Error],
	)
	.allow(
		SellState::GettingNonce,
		vec![SellState::CreatingMessage, SellState::Error],
	)
	.allow(
		SellState::CreatingMessage,
		vec![SellState::Signing, SellState::Error],
	)
	.allow(
		SellState::Signing,
		vec![SellState::ApprovingNft, SellState::Error],
	)
	.allow(
		SellState::ApprovingNft,
		vec![SellState::BuildingOrder, SellState::Error],
	)
	.allow(
		SellState::BuildingOrder,
		vec![SellState::Success, SellState::Error],
	)
	.allow(SellState::Success, vec![SellState::Idle])
	.allow(SellState::Error, vec![SellState::Idle])
	.resolver(resolve)
	.applier(apply)
	.error_setter(|context: &mut SellContext, message| {
		context.error_message = Some(message);
	})
	.build()
}

/// The sell-order workflow bound to its capability services.
#[derive(Clone)]
pub struct SellOrderWorkflow {
	machine: Machine<SellState, SellContext>,
}

impl SellOrderWorkflow {
	/// Builds the workflow. Fails if the definition is internally
	/// inconsistent.
	pub fn new(capabilities: Capabilities) -> Result<Self, DefinitionError> {
		Ok(Self {
			machine: Machine::new(Arc::new(definition(capabilities)?)),
		})
	}

	/// Runs the listing to a terminal state.
	pub async fn start(&self, params: SellOrderParams) -> Result<SellState, MachineError> {
		self.machine
			.start_with(move |context| {
				context.nft_contract = Some(params.nft_contract);
				context.token_id = Some(params.token_id);
				context.price = Some(params.price);
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
	pub fn context(&self) -> SellContext {
		self.machine.context()
	}

	/// The state the workflow currently rests in.
	pub fn current_state(&self) -> SellState {
		self.machine.current_state()
	}

	/// Whether the workflow currently rests in `state`.
	pub fn is_in_state(&self, state: SellState) -> bool {
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
	use crate::testing::{capabilities_with_account, capabilities_with_mock, RejectingAccount};
	use orderflow_chain::implementations::mock::MockChain;
	use orderflow_types::utils::conversion::parse_ether;
	use orderflow_types::B256;

	fn params(price: U256) -> SellOrderParams {
		SellOrderParams {
			nft_contract: Address::repeat_byte(0x33),
			token_id: U256::from(10),
			price,
		}
	}

	#[tokio::test]
	async fn test_listing_happy_path() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_mock(mock.clone());
		let workflow = SellOrderWorkflow::new(caps.clone()).unwrap();

		let price = parse_ether("0.0001").unwrap();
		let terminal = workflow.start(params(price)).await.unwrap();

		assert_eq!(terminal, SellState::Success);
		assert_eq!(workflow.progress(), 100);

		let context = workflow.context();
		let signed = context.signed_order.unwrap();
		assert_eq!(signed.order.side, OrderSide::Sell);
		assert_eq!(signed.order.price, U256::from(100_000_000_000_000u64));
		assert_eq!(signed.order.create_at, U256::from(1_700_000_000u64));
		assert_eq!(signed.order.valid_until, U256::from(1_700_003_600u64));
		assert_eq!(signed.block_number, 100);
		assert_eq!(signed.signature_version, 0);
		assert!(signed.extra_signature.is_empty());
		assert!(signed.v == 27 || signed.v == 28);

		// Zero nonce from a fresh account is a value, not an absence.
		assert_eq!(context.nonce, Some(U256::ZERO));

		// The NFT was approved to the transfer manager.
		let approvals = mock.approvals();
		assert_eq!(approvals.len(), 1);
		assert_eq!(approvals[0].0, caps.config.contracts.transfer_manager);
		assert_eq!(approvals[0].1, U256::from(10));

		// The payload is cached for a later matching run.
		let cached: SignedOrder = caps.storage.retrieve(StorageKey::SellOrder).await.unwrap();
		assert_eq!(cached, signed);
	}

	#[tokio::test]
	async fn test_rejected_signature_keeps_message_and_unsets_signature() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_account(mock.clone(), Box::new(RejectingAccount));
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::from(1))).await.unwrap();

		assert_eq!(terminal, SellState::Error);
		assert_eq!(workflow.progress(), 0);
		let context = workflow.context();
		assert!(context.signature.is_none());
		assert!(context.typed_message.is_some());
		assert!(context.error_message.unwrap().contains("rejected"));
		assert!(mock.approvals().is_empty());
	}

	#[tokio::test]
	async fn test_supplied_signature_skips_the_wallet_prompt() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_account(mock, Box::new(RejectingAccount));
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		workflow.supply_signature(Signature {
			v: 27,
			r: B256::repeat_byte(0x11),
			s: B256::repeat_byte(0x22),
		});

		let terminal = workflow.start(params(U256::from(1))).await.unwrap();
		assert_eq!(terminal, SellState::Success);
		assert_eq!(workflow.context().signed_order.unwrap().v, 27);
	}

	#[tokio::test]
	async fn test_chain_time_failure_reports_after_bounded_retries() {
		let mock = MockChain::new().fail_block_number_times(10);
		let caps = capabilities_with_mock(mock.clone());
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		tokio::time::pause();
		let terminal = workflow.start(params(U256::from(1))).await.unwrap();

		assert_eq!(terminal, SellState::Error);
		assert_eq!(mock.block_number_attempts(), 3);
		let message = workflow.context().error_message.unwrap();
		assert!(message.contains("cannot get block number"));
	}

	#[tokio::test]
	async fn test_nonce_failure_is_not_retried() {
		let mock = MockChain::new().with_block(100, 1_700_000_000).fail_nonce();
		let caps = capabilities_with_mock(mock.clone());
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::from(1))).await.unwrap();

		// Only the chain-time fetch retries; the nonce read fails once.
		assert_eq!(terminal, SellState::Error);
		assert_eq!(mock.nonce_attempts(), 1);
		let message = workflow.context().error_message.unwrap();
		assert!(message.contains("Mock nonce failure"));
	}

	#[tokio::test]
	async fn test_restart_requires_reset() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_mock(mock);
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		workflow.start(params(U256::from(1))).await.unwrap();
		assert!(matches!(
			workflow.start(params(U256::from(1))).await,
			Err(MachineError::NotIdle(_))
		));

		workflow.reset();
		assert!(workflow.is_in_state(SellState::Idle));
		assert!(workflow.context().signed_order.is_none());
		let terminal = workflow.start(params(U256::from(2))).await.unwrap();
		assert_eq!(terminal, SellState::Success);
	}

	#[tokio::test]
	async fn test_zero_price_listing_is_valid() {
		let mock = MockChain::new().with_block(100, 1_700_000_000);
		let caps = capabilities_with_mock(mock);
		let workflow = SellOrderWorkflow::new(caps).unwrap();

		let terminal = workflow.start(params(U256::ZERO)).await.unwrap();
		assert_eq!(terminal, SellState::Success);
		assert_eq!(
			workflow.context().signed_order.unwrap().order.price,
			U256::ZERO
		);
	}
}
