//! Local private-key account implementation.
//!
//! Signs order messages with an in-process key. This is the signer used in
//! tests and in headless environments; interactive wallets implement the
//! same interface behind their own prompt flow.

use crate::{AccountError, AccountInterface};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use orderflow_types::{Address, Signature, TypedMessage};

/// Account implementation backed by a local private key.
pub struct LocalAccount {
	/// The in-process signer.
	signer: PrivateKeySigner,
}

impl LocalAccount {
	/// Creates a LocalAccount from an existing signer.
	pub fn new(signer: PrivateKeySigner) -> Self {
		Self { signer }
	}

	/// Parses a hex-encoded private key (with or without 0x prefix).
	pub fn from_private_key(key: &str) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = key
			.parse()
			.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))?;
		Ok(Self::new(signer))
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_typed_data(&self, message: &TypedMessage) -> Result<Signature, AccountError> {
		let digest = message.signing_hash();
		let signature = self
			.signer
			.sign_hash(&digest)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		// The exchange contract expects the pre-EIP-155 recovery id.
		Ok(Signature {
			v: 27 + u8::from(signature.v()),
			r: signature.r().into(),
			s: signature.s().into(),
		})
	}
}
