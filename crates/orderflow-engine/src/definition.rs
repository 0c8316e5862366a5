//! Workflow definitions: states, registry, transition table and resolver.
//!
//! A `WorkflowDefinition` is the immutable description of one workflow:
//! the distinguished IDLE/entry/SUCCESS/ERROR states, a registry entry per
//! state, the allowed transition edges, the pure transition resolver and
//! the context merge functions. Definitions are validated when built, so
//! a machine running a built definition never fails a descriptor lookup.

use crate::{DefinitionError, StateRegistry, StepDescriptor};
use orderflow_types::StepOutcome;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

/// Merges a step outcome into the workflow context. Fields carried by the
/// outcome win; everything else in the context persists.
pub type ContextApplier<C> = Arc<dyn Fn(&mut C, &StepOutcome) + Send + Sync>;

/// Records an error message in the workflow context.
pub type ErrorSetter<C> = Arc<dyn Fn(&mut C, String) + Send + Sync>;

/// Pure transition resolver: maps the current state and a tagged step
/// outcome to the next state. `None` marks an internal consistency
/// failure the runner routes to ERROR.
pub type TransitionResolver<S> = fn(S, &StepOutcome) -> Option<S>;

/// Immutable description of one workflow.
pub struct WorkflowDefinition<S, C> {
	name: &'static str,
	idle: S,
	entry: S,
	success: S,
	error: S,
	registry: StateRegistry<S, C>,
	transitions: HashMap<S, Vec<S>>,
	resolver: TransitionResolver<S>,
	applier: ContextApplier<C>,
	error_setter: ErrorSetter<C>,
}

impl<S, C> WorkflowDefinition<S, C>
where
	S: Copy + Eq + Hash + Display,
{
	/// Starts building a definition around its distinguished states.
	pub fn builder(
		name: &'static str,
		idle: S,
		entry: S,
		success: S,
		error: S,
	) -> WorkflowDefinitionBuilder<S, C> {
		WorkflowDefinitionBuilder {
			name,
			idle,
			entry,
			success,
			error,
			registry: StateRegistry::new(),
			transitions: HashMap::new(),
			resolver: None,
			applier: None,
			error_setter: None,
		}
	}

	/// The workflow's name, used in logs.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// The resting state before a run and after reset.
	pub fn idle(&self) -> S {
		self.idle
	}

	/// The first state a run enters.
	pub fn entry(&self) -> S {
		self.entry
	}

	/// The terminal success state.
	pub fn success(&self) -> S {
		self.success
	}

	/// The terminal error state.
	pub fn error_state(&self) -> S {
		self.error
	}

	/// Looks up the registry entry for a state.
	pub fn descriptor(&self, state: &S) -> Option<&StepDescriptor<C>> {
		self.registry.get(state)
	}

	/// Whether the transition table allows the edge `from -> to`.
	pub fn allows(&self, from: S, to: S) -> bool {
		self.transitions
			.get(&from)
			.map(|targets| targets.contains(&to))
			.unwrap_or(false)
	}

	/// Resolves the next state for an outcome produced in `state`.
	pub fn resolve(&self, state: S, outcome: &StepOutcome) -> Option<S> {
		(self.resolver)(state, outcome)
	}

	/// Merges an outcome into the context.
	pub fn apply(&self, context: &mut C, outcome: &StepOutcome) {
		(self.applier)(context, outcome);
	}

	/// Records an error message in the context.
	pub fn set_error(&self, context: &mut C, message: String) {
		(self.error_setter)(context, message);
	}
}

/// Builder for [`WorkflowDefinition`]; `build()` validates the result.
pub struct WorkflowDefinitionBuilder<S, C> {
	name: &'static str,
	idle: S,
	entry: S,
	success: S,
	error: S,
	registry: StateRegistry<S, C>,
	transitions: HashMap<S, Vec<S>>,
	resolver: Option<TransitionResolver<S>>,
	applier: Option<ContextApplier<C>>,
	error_setter: Option<ErrorSetter<C>>,
}

impl<S, C> WorkflowDefinitionBuilder<S, C>
where
	S: Copy + Eq + Hash + Display,
{
	/// Registers the descriptor for a state.
	pub fn register(mut self, state: S, descriptor: StepDescriptor<C>) -> Self {
		self.registry.insert(state, descriptor);
		self
	}

	/// Declares the allowed successor states of `from`.
	pub fn allow(mut self, from: S, to: Vec<S>) -> Self {
		self.transitions.insert(from, to);
		self
	}

	/// Sets the transition resolver.
	pub fn resolver(mut self, resolver: TransitionResolver<S>) -> Self {
		self.resolver = Some(resolver);
		self
	}

	/// Sets the outcome-to-context merge function.
	pub fn applier(
		mut self,
		applier: impl Fn(&mut C, &StepOutcome) + Send + Sync + 'static,
	) -> Self {
		self.applier = Some(Arc::new(applier));
		self
	}

	/// Sets the error message recorder.
	pub fn error_setter(
		mut self,
		setter: impl Fn(&mut C, String) + Send + Sync + 'static,
	) -> Self {
		self.error_setter = Some(Arc::new(setter));
		self
	}

	/// Validates the definition and produces it.
	///
	/// Rules: every distinguished state and every state mentioned by the
	/// transition table has a registry entry; ERROR carries progress 0 and
	/// SUCCESS progress 100; progress never decreases along a non-ERROR
	/// edge.
	pub fn build(self) -> Result<WorkflowDefinition<S, C>, DefinitionError> {
		let resolver = self
			.resolver
			.ok_or(DefinitionError::Incomplete("no resolver"))?;
		let applier = self.applier.ok_or(DefinitionError::Incomplete("no applier"))?;
		let error_setter = self
			.error_setter
			.ok_or(DefinitionError::Incomplete("no error setter"))?;

		for state in [self.idle, self.entry, self.success, self.error] {
			if !self.registry.contains(&state) {
				return Err(DefinitionError::MissingDescriptor(state.to_string()));
			}
		}

		for (from, targets) in &self.transitions {
			let from_descriptor = self
				.registry
				.get(from)
				.ok_or_else(|| DefinitionError::MissingDescriptor(from.to_string()))?;
			for to in targets {
				let to_descriptor = self
					.registry
					.get(to)
					.ok_or_else(|| DefinitionError::MissingDescriptor(to.to_string()))?;
				// Edges into ERROR and the reset edges back into IDLE
				// are the only places progress may drop.
				if *to != self.error
					&& *to != self.idle
					&& to_descriptor.progress < from_descriptor.progress
				{
					return Err(DefinitionError::DecreasingProgress {
						from: from.to_string(),
						from_progress: from_descriptor.progress,
						to: to.to_string(),
						to_progress: to_descriptor.progress,
					});
				}
			}
		}

		for (state, expected) in [(self.error, 0u8), (self.success, 100u8)] {
			if let Some(descriptor) = self.registry.get(&state) {
				if descriptor.progress != expected {
					return Err(DefinitionError::TerminalProgress {
						state: state.to_string(),
						expected,
						found: descriptor.progress,
					});
				}
			}
		}

		Ok(WorkflowDefinition {
			name: self.name,
			idle: self.idle,
			entry: self.entry,
			success: self.success,
			error: self.error,
			registry: self.registry,
			transitions: self.transitions,
			resolver,
			applier,
			error_setter,
		})
	}
}
