//! Common types module for the NFT order workflow system.
//!
//! This module defines the core data types and structures shared by the
//! workflow engine, the concrete workflow definitions, and the capability
//! crates. It provides a centralized location for shared types to ensure
//! consistency across all components.

/// Wallet-related types: signatures produced by typed-data signing.
pub mod account;
/// Chain-facing types: transaction hashes, receipts, chain time snapshots.
pub mod chain;
/// EIP-712 typed message construction and digest computation.
pub mod message;
/// Marketplace order types: sides, fees, orders and signed order payloads.
pub mod order;
/// The closed set of tagged step results produced by workflow actions.
pub mod outcome;
/// Utility functions for conversions and EIP-712 encoding.
pub mod utils;

// Re-export all types for convenient access
pub use account::*;
pub use chain::*;
pub use message::*;
pub use order::*;
pub use outcome::*;
pub use utils::conversion::{parse_ether, ConversionError};

// The primitive types every crate in the workspace speaks.
pub use alloy_primitives::{Address, Bytes, B256, U256};
