//! Concrete order workflows for the NFT marketplace.
//!
//! Three workflows instantiate the generic engine in
//! [`orderflow_engine`]: listing an NFT for sale, buying a listed NFT, and
//! placing a collection-wide bid funded from the escrow pool. Each one is
//! a [`WorkflowDefinition`](orderflow_engine::WorkflowDefinition) built
//! from a state registry, a transition table and a pure resolver, driven
//! by a [`Machine`](orderflow_engine::Machine) and operating exclusively
//! through the injected [`Capabilities`].

pub mod bid;
pub mod buy;
pub mod capabilities;
pub mod sell;

pub use bid::{BidContext, BidParams, BidState, CollectionBidWorkflow};
pub use buy::{BuyContext, BuyOrderParams, BuyOrderWorkflow, BuyState};
pub use capabilities::Capabilities;
pub use sell::{SellContext, SellOrderParams, SellOrderWorkflow, SellState};

#[cfg(test)]
pub(crate) mod testing {
	//! Shared fixtures for the workflow tests.

	use crate::Capabilities;
	use async_trait::async_trait;
	use orderflow_account::{AccountError, AccountInterface, AccountService};
	use orderflow_account::implementations::local::LocalAccount;
	use orderflow_chain::implementations::mock::MockChain;
	use orderflow_chain::ChainService;
	use orderflow_config::Config;
	use orderflow_storage::implementations::memory::MemoryStorage;
	use orderflow_storage::StorageService;
	use orderflow_types::{Address, Signature, TypedMessage};
	use std::sync::Arc;

	pub(crate) const TEST_KEY: &str =
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	pub(crate) fn test_config() -> Config {
		Config::from_toml_str(
			r#"
[chain]
chain_id = 11155111
rpc_url = "https://rpc.sepolia.org"

[contracts]
exchange = "0x4c85004Ef5c4124E8acEf182700B4aec971974b1"
transfer_manager = "0x8c35EbA1A0543737626425abC778368D82902E24"
nft = "0xf717d1C73fc93452E067f2288542604A12295900"
eth_pool = "0x1fA04D79F175a30fA8FDF01f068B6998E3397Db4"
default_policy = "0x0000000000000000000000000000000000000d01"
pool_policy = "0x0000000000000000000000000000000000000d02"
"#,
		)
		.unwrap()
	}

	/// An account whose holder declines every signature prompt.
	pub(crate) struct RejectingAccount;

	#[async_trait]
	impl AccountInterface for RejectingAccount {
		async fn address(&self) -> Result<Address, AccountError> {
			Ok(Address::repeat_byte(0x42))
		}

		async fn sign_typed_data(
			&self,
			_message: &TypedMessage,
		) -> Result<Signature, AccountError> {
			Err(AccountError::Rejected("user declined in wallet".to_string()))
		}
	}

	pub(crate) fn capabilities_with_account(
		mock: MockChain,
		account: Box<dyn AccountInterface>,
	) -> Capabilities {
		let config = Arc::new(test_config());
		let chain = Arc::new(ChainService::single(
			config.chain.chain_id,
			Box::new(mock),
		));
		let account = Arc::new(AccountService::new(account));
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Capabilities::new(chain, account, storage, config)
	}

	pub(crate) fn capabilities_with_mock(mock: MockChain) -> Capabilities {
		let local = LocalAccount::from_private_key(TEST_KEY).unwrap();
		capabilities_with_account(mock, Box::new(local))
	}
}
