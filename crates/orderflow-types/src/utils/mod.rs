//! Utility functions shared across the workflow system.

/// Conversions between user-facing values and on-chain representations.
pub mod conversion;
/// Generic EIP-712 hashing helpers.
pub mod eip712;
