//! Storage module for the NFT order workflow system.
//!
//! The workflows persist exactly one kind of artifact: the final built
//! order payload, cached under a fixed key per workflow so a later
//! matching run can load both sides. This module provides the save/load
//! capability behind that, with in-memory and file-based backends.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Fixed keys the workflows cache their built orders under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// The last completed sell order.
	SellOrder,
	/// The last completed buy order.
	BuyOrder,
	/// The last completed collection bid.
	CollectionBid,
}

impl StorageKey {
	/// The string form used as the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::SellOrder => "sell-order",
			StorageKey::BuyOrder => "buy-order",
			StorageKey::CollectionBid => "collection-bid",
		}
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// integrate with the workflow system. It provides basic key-value
/// operations over raw bytes.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, overwriting any prior value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic JSON serialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value under a workflow storage key.
	pub async fn store<T: Serialize>(
		&self,
		key: StorageKey,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(key.as_str(), bytes).await
	}

	/// Retrieves and deserializes a value stored under a workflow key.
	pub async fn retrieve<T: DeserializeOwned>(&self, key: StorageKey) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(key.as_str()).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Removes a value from storage.
	pub async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
		self.backend.delete(key.as_str()).await
	}

	/// Checks if a value exists under a workflow key.
	pub async fn exists(&self, key: StorageKey) -> Result<bool, StorageError> {
		self.backend.exists(key.as_str()).await
	}
}
