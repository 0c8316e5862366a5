//! Tagged step results produced by workflow actions.
//!
//! Every step action returns one of these variants instead of an untyped
//! partial record, so transition resolvers switch on a closed tag set and
//! zero-valued numerics are unambiguously present: presence is variant
//! identity, not truthiness.

use alloy_primitives::U256;

use crate::{ChainTime, MatchResult, Signature, SignedOrder, TransactionHash, TypedMessage};

/// The result of a successfully executed workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
	/// Wallet, network and input parameters are valid.
	Validated,
	/// Native and pool balances were read for a funds check.
	FundsChecked {
		native_balance: U256,
		pool_balance: U256,
	},
	/// Pool balance was read and compared against the bid amount.
	BalanceChecked {
		balance: U256,
		needs_deposit: bool,
		required_deposit: U256,
	},
	/// The shortfall was deposited into the pool.
	Deposited {
		amount: U256,
		tx_hash: TransactionHash,
	},
	/// Post-deposit balance covers the bid amount.
	BalanceConfirmed { balance: U256 },
	/// Chain time was fetched and the validity window computed.
	TimeFetched {
		chain_time: ChainTime,
		valid_until: U256,
		create_at: U256,
	},
	/// The order nonce was read from the exchange contract.
	NonceFetched { nonce: U256 },
	/// The EIP-712 message was constructed.
	MessageCreated { typed_message: TypedMessage },
	/// The wallet holder signed the message.
	Signed { signature: Signature },
	/// A token approval transaction confirmed.
	Approved { tx_hash: TransactionHash },
	/// The final signed order payload was assembled.
	OrderBuilt { signed_order: SignedOrder },
	/// The order or bid was submitted on chain.
	Submitted { tx_hash: TransactionHash },
	/// Terminal bookkeeping ran after SUCCESS; matching, when attempted,
	/// reports its result or a non-fatal error here.
	Finalized {
		match_result: Option<MatchResult>,
		matching_error: Option<String>,
	},
}

impl StepOutcome {
	/// Short tag name used in diagnostics and transition errors.
	pub fn kind(&self) -> &'static str {
		match self {
			StepOutcome::Validated => "Validated",
			StepOutcome::FundsChecked { .. } => "FundsChecked",
			StepOutcome::BalanceChecked { .. } => "BalanceChecked",
			StepOutcome::Deposited { .. } => "Deposited",
			StepOutcome::BalanceConfirmed { .. } => "BalanceConfirmed",
			StepOutcome::TimeFetched { .. } => "TimeFetched",
			StepOutcome::NonceFetched { .. } => "NonceFetched",
			StepOutcome::MessageCreated { .. } => "MessageCreated",
			StepOutcome::Signed { .. } => "Signed",
			StepOutcome::Approved { .. } => "Approved",
			StepOutcome::OrderBuilt { .. } => "OrderBuilt",
			StepOutcome::Submitted { .. } => "Submitted",
			StepOutcome::Finalized { .. } => "Finalized",
		}
	}
}
