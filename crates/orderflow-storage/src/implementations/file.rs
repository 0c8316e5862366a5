//! File-based storage backend implementation.
//!
//! This module stores each key as one file under a base directory, so a
//! built order survives process restarts. Keys are sanitized into file
//! names; values are written whole and replaced atomically via a rename.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-based storage implementation.
///
/// One file per key under `base_dir`. Writes go to a temporary sibling
/// first and are renamed into place so readers never observe a partial
/// value.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_dir: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at the given directory.
	///
	/// The directory is created on first write if it does not exist.
	pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
		}
	}

	/// Maps a storage key to its file path, keeping only characters that
	/// are safe in file names.
	fn path_for(&self, key: &str) -> PathBuf {
		let safe: String = key
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.base_dir.join(format!("{}.json", safe))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.path_for(key);
		match fs::read(&path).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let path = self.path_for(key);
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, &value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&tmp, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::debug!(key, bytes = value.len(), "Persisted storage entry");
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.path_for(key);
		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.path_for(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}
