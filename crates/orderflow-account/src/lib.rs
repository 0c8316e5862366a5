//! Account management module for the NFT order workflow system.
//!
//! This module provides abstractions for the wallet side of a workflow:
//! retrieving the connected account's address and collecting EIP-712
//! signatures over order messages. A wallet holder declining a signature
//! prompt surfaces as a distinguished error.

use async_trait::async_trait;
use orderflow_types::{Address, Signature, TypedMessage};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when the wallet holder declines the signature
	/// prompt.
	#[error("Signature rejected: {0}")]
	Rejected(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Trait defining the interface for account implementations.
///
/// This trait must be implemented by any wallet backing that wants to
/// integrate with the workflow system, whether a local key or a remote
/// UI-driven signer.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs an EIP-712 typed message using the account's key.
	///
	/// Returns the split signature components the exchange contract
	/// expects, or an error if signing fails or is declined.
	async fn sign_typed_data(&self, message: &TypedMessage) -> Result<Signature, AccountError>;
}

/// Service that manages account operations.
///
/// This struct provides a high-level interface for account management,
/// wrapping an underlying account implementation.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs an EIP-712 typed message using the managed account.
	pub async fn sign_typed_data(
		&self,
		message: &TypedMessage,
	) -> Result<Signature, AccountError> {
		self.implementation.sign_typed_data(message).await
	}
}
