//! Error types for the workflow engine.

use orderflow_types::U256;
use thiserror::Error;

/// Errors produced by step actions.
///
/// Actions fail with one of these; the runner routes the machine to its
/// ERROR state and records the message in the context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
	/// Preconditions for the workflow were not met.
	#[error("Validation failed: {0}")]
	Validation(String),
	/// The account cannot cover the order amount.
	#[error("Insufficient funds: have {available}, need {required}")]
	InsufficientFunds { available: U256, required: U256 },
	/// The wallet holder declined the signature prompt.
	#[error("Signature rejected: {0}")]
	SignatureRejected(String),
	/// A chain, account or storage capability failed.
	#[error("Capability error: {0}")]
	Capability(String),
}

/// Construction-time validation failures of a workflow definition.
///
/// A definition that passes construction can never hit a missing-descriptor
/// lookup at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
	/// The builder is missing a required component.
	#[error("Definition is incomplete: {0}")]
	Incomplete(&'static str),
	/// A state appears in the transition table without a registry entry.
	#[error("State {0} has no registry entry")]
	MissingDescriptor(String),
	/// A terminal state carries the wrong progress value.
	#[error("State {state} must carry progress {expected}, found {found}")]
	TerminalProgress {
		state: String,
		expected: u8,
		found: u8,
	},
	/// Progress decreases along a non-ERROR edge.
	#[error("Progress decreases along {from} ({from_progress}) -> {to} ({to_progress})")]
	DecreasingProgress {
		from: String,
		from_progress: u8,
		to: String,
		to_progress: u8,
	},
}

/// Runtime errors produced by the machine itself, as opposed to its steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
	/// start() was called while a run was already in flight or the machine
	/// was not in IDLE.
	#[error("Workflow is already running")]
	AlreadyRunning,
	/// start() was called from a state other than IDLE.
	#[error("Workflow can only start from IDLE, currently in {0}")]
	NotIdle(String),
}
