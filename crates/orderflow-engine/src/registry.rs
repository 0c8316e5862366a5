//! Per-state registry entries for workflow definitions.
//!
//! Each state of a workflow carries a registry entry: a user-facing label,
//! a progress percentage, an optional async action and an optional guard.
//! The runner consults the entry on arrival in a state; states without an
//! action (IDLE, terminal states without bookkeeping) simply rest.

use crate::StepError;
use futures::future::BoxFuture;
use orderflow_types::StepOutcome;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Async step action. Receives a snapshot of the workflow context and
/// produces a tagged outcome. The runner never holds the machine lock
/// while an action is in flight.
pub type StepAction<C> =
	Arc<dyn Fn(C) -> BoxFuture<'static, Result<StepOutcome, StepError>> + Send + Sync>;

/// Synchronous predicate checked before a state's action runs. A failing
/// guard routes the machine to its ERROR state.
pub type StepGuard<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Registry entry describing one state of a workflow.
#[derive(Clone)]
pub struct StepDescriptor<C> {
	/// User-facing label shown while the state is active.
	pub label: &'static str,
	/// Progress percentage reported while in this state (0..=100).
	pub progress: u8,
	/// Action executed on arrival, if any.
	pub action: Option<StepAction<C>>,
	/// Guard checked before the action runs, if any.
	pub guard: Option<StepGuard<C>>,
}

impl<C> StepDescriptor<C> {
	/// Creates a passive entry with no action and no guard.
	pub fn passive(label: &'static str, progress: u8) -> Self {
		Self {
			label,
			progress,
			action: None,
			guard: None,
		}
	}

	/// Creates an entry with an action.
	pub fn active(label: &'static str, progress: u8, action: StepAction<C>) -> Self {
		Self {
			label,
			progress,
			action: Some(action),
			guard: None,
		}
	}

	/// Attaches a guard to this entry.
	pub fn with_guard(mut self, guard: StepGuard<C>) -> Self {
		self.guard = Some(guard);
		self
	}
}

/// The full state registry of a workflow: one descriptor per state.
pub struct StateRegistry<S, C> {
	entries: HashMap<S, StepDescriptor<C>>,
}

impl<S: Copy + Eq + Hash, C> StateRegistry<S, C> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self {
			entries: HashMap::new(),
		}
	}

	/// Registers a descriptor for a state, replacing any previous entry.
	pub fn insert(&mut self, state: S, descriptor: StepDescriptor<C>) {
		self.entries.insert(state, descriptor);
	}

	/// Looks up the descriptor for a state.
	pub fn get(&self, state: &S) -> Option<&StepDescriptor<C>> {
		self.entries.get(state)
	}

	/// Whether a state has a registry entry.
	pub fn contains(&self, state: &S) -> bool {
		self.entries.contains_key(state)
	}
}

impl<S: Copy + Eq + Hash, C> Default for StateRegistry<S, C> {
	fn default() -> Self {
		Self::new()
	}
}
