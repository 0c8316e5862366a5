//! Dependency-injected capability bundle and shared step helpers.
//!
//! Every machine receives one [`Capabilities`] value at construction time;
//! step action closures capture a clone of it. Nothing in the workflows
//! reaches for a global.

use orderflow_account::AccountService;
use orderflow_chain::{ChainError, ChainService};
use orderflow_config::Config;
use orderflow_engine::StepError;
use orderflow_storage::StorageService;
use orderflow_types::{Address, ChainTime, StepOutcome, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How many times each phase of the chain-time fetch is attempted.
pub(crate) const CHAIN_TIME_ATTEMPTS: u32 = 3;
/// Delay between chain-time fetch attempts.
pub(crate) const CHAIN_TIME_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The capability services a workflow operates through.
///
/// Cheap to clone; all services are shared.
#[derive(Clone)]
pub struct Capabilities {
	/// RPC reads and transaction submission.
	pub chain: Arc<ChainService>,
	/// Wallet address and EIP-712 signing.
	pub account: Arc<AccountService>,
	/// Persistence for built order payloads.
	pub storage: Arc<StorageService>,
	/// Chain, contract and order configuration.
	pub config: Arc<Config>,
}

impl Capabilities {
	/// Bundles the capability services.
	pub fn new(
		chain: Arc<ChainService>,
		account: Arc<AccountService>,
		storage: Arc<StorageService>,
		config: Arc<Config>,
	) -> Self {
		Self {
			chain,
			account,
			storage,
			config,
		}
	}

	/// The chain the workflows operate on.
	pub fn chain_id(&self) -> u64 {
		self.config.chain.chain_id
	}

	/// The connected wallet address, as a step error on failure.
	pub(crate) async fn trader_address(&self) -> Result<Address, StepError> {
		self.account
			.get_address()
			.await
			.map_err(|e| StepError::Capability(e.to_string()))
	}
}

/// Extracts a context field that an earlier step must have produced.
pub(crate) fn require<T: Clone>(value: &Option<T>, what: &str) -> Result<T, StepError> {
	value
		.clone()
		.ok_or_else(|| StepError::Validation(format!("missing {} in context", what)))
}

/// Fetches the chain time snapshot the validity window is stamped from.
///
/// The block number and the block information are fetched in two phases,
/// each retried independently up to [`CHAIN_TIME_ATTEMPTS`] times with
/// [`CHAIN_TIME_RETRY_DELAY`] between attempts. Every other workflow step
/// fails on its first error; this one retries because a transient RPC
/// hiccup here would otherwise abort an order the user already confirmed.
pub(crate) async fn fetch_chain_time(caps: &Capabilities) -> Result<ChainTime, StepError> {
	let chain_id = caps.chain_id();

	let block_number =
		read_with_retries("block number", || caps.chain.get_block_number(chain_id)).await?;
	let timestamp = read_with_retries("block information", || {
		caps.chain.get_block_timestamp(chain_id, block_number)
	})
	.await?;

	Ok(ChainTime {
		block_number,
		timestamp,
	})
}

/// Stamps the validity window onto a chain time snapshot.
pub(crate) fn time_outcome(chain_time: ChainTime, validity_seconds: u64) -> StepOutcome {
	let create_at = U256::from(chain_time.timestamp);
	let valid_until = create_at + U256::from(validity_seconds);
	StepOutcome::TimeFetched {
		chain_time,
		valid_until,
		create_at,
	}
}

async fn read_with_retries<T, F, Fut>(what: &str, read: F) -> Result<T, StepError>
where
	F: Fn() -> Fut,
	Fut: Future<Output = Result<T, ChainError>>,
{
	let mut last_error = None;
	for attempt in 1..=CHAIN_TIME_ATTEMPTS {
		match read().await {
			Ok(value) => return Ok(value),
			Err(e) => {
				tracing::warn!(what, attempt, error = %e, "Chain time read failed");
				last_error = Some(e);
			}
		}
		if attempt < CHAIN_TIME_ATTEMPTS {
			tokio::time::sleep(CHAIN_TIME_RETRY_DELAY).await;
		}
	}

	Err(StepError::Capability(match last_error {
		Some(e) => format!("cannot get {}: {}", what, e),
		None => format!("cannot get {}", what),
	}))
}
