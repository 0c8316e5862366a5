//! Configuration module for the NFT order workflow system.
//!
//! This module provides structures and utilities for loading workflow
//! configuration from TOML files: the target chain, the marketplace
//! contract addresses, and order defaults. Validation ensures required
//! values are present before any machine is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use orderflow_types::Address;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the workflow system.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// The chain the workflows operate on.
	pub chain: ChainConfig,
	/// Marketplace contract addresses.
	pub contracts: ContractsConfig,
	/// Order construction defaults.
	#[serde(default)]
	pub order: OrderConfig,
}

/// The chain the workflows operate on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Chain ID (e.g. 11155111 for Sepolia).
	pub chain_id: u64,
	/// RPC endpoint URL.
	pub rpc_url: String,
}

/// Marketplace contract addresses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsConfig {
	/// The exchange contract orders are signed for and matched on.
	pub exchange: Address,
	/// The transfer manager NFTs are approved to before listing.
	pub transfer_manager: Address,
	/// The NFT collection contract.
	pub nft: Address,
	/// The escrow pool holding prepaid bid funds.
	pub eth_pool: Address,
	/// Matching policy for single-token orders.
	pub default_policy: Address,
	/// Matching policy for pool-funded collection bids.
	pub pool_policy: Address,
}

/// Order construction defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderConfig {
	/// Seconds an order stays valid after its chain-time creation stamp.
	#[serde(default = "default_validity_seconds")]
	pub validity_seconds: u64,
}

impl Default for OrderConfig {
	fn default() -> Self {
		Self {
			validity_seconds: default_validity_seconds(),
		}
	}
}

/// Orders expire one hour after creation unless configured otherwise.
fn default_validity_seconds() -> u64 {
	3600
}

impl Config {
	/// Parses configuration from a TOML string and validates it.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads configuration from a TOML file and validates it.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)?;
		Self::from_toml_str(&contents)
	}

	/// Checks invariants that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.chain.chain_id == 0 {
			return Err(ConfigError::Validation(
				"chain.chain_id must be non-zero".to_string(),
			));
		}
		if self.chain.rpc_url.is_empty() {
			return Err(ConfigError::Validation(
				"chain.rpc_url must not be empty".to_string(),
			));
		}
		if self.order.validity_seconds == 0 {
			return Err(ConfigError::Validation(
				"order.validity_seconds must be non-zero".to_string(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const EXAMPLE: &str = r#"
[chain]
chain_id = 11155111
rpc_url = "https://rpc.sepolia.org"

[contracts]
exchange = "0x4c85004Ef5c4124E8acEf182700B4aec971974b1"
transfer_manager = "0x8c35EbA1A0543737626425abC778368D82902E24"
nft = "0xf717d1C73fc93452E067f2288542604A12295900"
eth_pool = "0xD7E3A8C772088bc1728f1fdA08a8e07DCd4d479a"
default_policy = "0x245ed3Cc6c3A64c04A4f01e630Cca450Bacf99cE"
pool_policy = "0xA3FDDC2025fC17e4a0B7b16AF5F7423859427607"
"#;

	#[test]
	fn test_parse_example_config() {
		let config = Config::from_toml_str(EXAMPLE).unwrap();
		assert_eq!(config.chain.chain_id, 11_155_111);
		assert_eq!(config.order.validity_seconds, 3600);
	}

	#[test]
	fn test_validity_override() {
		let with_order = format!("{EXAMPLE}\n[order]\nvalidity_seconds = 600\n");
		let config = Config::from_toml_str(&with_order).unwrap();
		assert_eq!(config.order.validity_seconds, 600);
	}

	#[test]
	fn test_rejects_zero_chain_id() {
		let broken = EXAMPLE.replace("chain_id = 11155111", "chain_id = 0");
		assert!(matches!(
			Config::from_toml_str(&broken),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_rejects_missing_section() {
		assert!(matches!(
			Config::from_toml_str("[chain]\nchain_id = 1\nrpc_url = \"x\"\n"),
			Err(ConfigError::Parse(_))
		));
	}
}
