//! The workflow machine runner.
//!
//! A [`Machine`] pairs a validated [`WorkflowDefinition`] with its owned
//! context and drives the run loop: execute the current state's action,
//! merge the outcome into the context, resolve and validate the next
//! state, check its guard, advance. Any action failure is caught and
//! routed to the ERROR state with the message recorded in the context;
//! nothing escapes to the caller as a panic or stray `Err`.
//!
//! Every run is tagged with the machine's generation counter. `reset()`
//! bumps the counter, so an action result arriving after a reset belongs
//! to a stale generation and is discarded instead of mutating the fresh
//! context.

use crate::{MachineError, WorkflowDefinition};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner<S, C> {
	current: S,
	context: C,
	progress: u8,
	generation: u64,
	running: bool,
}

/// A running instance of one workflow.
///
/// Cheap to clone; clones share the same state and context.
pub struct Machine<S, C> {
	definition: Arc<WorkflowDefinition<S, C>>,
	inner: Arc<Mutex<Inner<S, C>>>,
}

impl<S, C> Clone for Machine<S, C> {
	fn clone(&self) -> Self {
		Self {
			definition: Arc::clone(&self.definition),
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<S, C> Machine<S, C>
where
	S: Copy + Eq + Hash + Display + Send + 'static,
	C: Clone + Default + Send + 'static,
{
	/// Creates a machine resting in the definition's IDLE state with an
	/// empty context.
	pub fn new(definition: Arc<WorkflowDefinition<S, C>>) -> Self {
		let idle = definition.idle();
		let progress = definition
			.descriptor(&idle)
			.map(|d| d.progress)
			.unwrap_or(0);
		Self {
			definition,
			inner: Arc::new(Mutex::new(Inner {
				current: idle,
				context: C::default(),
				progress,
				generation: 0,
				running: false,
			})),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner<S, C>> {
		// The lock is never held across an await point, so a poisoned
		// lock can only come from a panicking closure; its state is
		// still coherent.
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// The state the machine currently rests in.
	pub fn current_state(&self) -> S {
		self.lock().current
	}

	/// Whether the machine currently rests in `state`.
	pub fn is_in_state(&self, state: S) -> bool {
		self.lock().current == state
	}

	/// The progress percentage of the current state.
	pub fn progress(&self) -> u8 {
		self.lock().progress
	}

	/// The user-facing label of the current state.
	pub fn current_step_label(&self) -> &'static str {
		let current = self.lock().current;
		self.definition
			.descriptor(&current)
			.map(|d| d.label)
			.unwrap_or("")
	}

	/// A snapshot of the workflow context.
	pub fn context(&self) -> C {
		self.lock().context.clone()
	}

	/// The current run generation. Bumped by every reset.
	pub fn generation(&self) -> u64 {
		self.lock().generation
	}

	/// Mutates the context out of band.
	///
	/// The only sanctioned use is supplying a value obtained through a UI
	/// side channel, such as a wallet signature collected outside the
	/// SIGNING action.
	pub fn with_context_mut(&self, f: impl FnOnce(&mut C)) {
		let mut inner = self.lock();
		f(&mut inner.context);
	}

	/// Returns the machine to IDLE with a cleared context.
	///
	/// Bumps the generation so any in-flight action result is discarded
	/// on arrival. Idempotent: resetting an idle machine leaves it idle.
	pub fn reset(&self) {
		let mut inner = self.lock();
		inner.generation += 1;
		inner.running = false;
		inner.current = self.definition.idle();
		inner.progress = self
			.definition
			.descriptor(&inner.current)
			.map(|d| d.progress)
			.unwrap_or(0);
		inner.context = C::default();
		tracing::debug!(workflow = self.definition.name(), "Machine reset");
	}

	/// Routes the machine to ERROR with the given message, unless the run
	/// generation has gone stale. Returns the resulting state.
	fn fail(&self, generation: u64, message: String) -> S {
		let mut inner = self.lock();
		if inner.generation != generation {
			return inner.current;
		}
		let error = self.definition.error_state();
		tracing::debug!(
			workflow = self.definition.name(),
			from = %inner.current,
			%message,
			"Routing to error state"
		);
		self.definition.set_error(&mut inner.context, message);
		inner.current = error;
		inner.progress = 0;
		inner.running = false;
		error
	}

	/// Runs the workflow from IDLE to a terminal state.
	///
	/// Returns the terminal state reached (SUCCESS or ERROR), or an error
	/// if the machine is already running or not in IDLE. Step failures do
	/// not surface here; they route the machine to ERROR with the message
	/// recorded in the context.
	pub async fn start(&self) -> Result<S, MachineError> {
		self.start_with(|_| {}).await
	}

	/// Like [`start`](Self::start), but seeds the context under the same
	/// lock that admits the run, so inputs can never leak into a run
	/// already in flight.
	pub async fn start_with(&self, seed: impl FnOnce(&mut C)) -> Result<S, MachineError> {
		let generation = {
			let mut inner = self.lock();
			if inner.running {
				return Err(MachineError::AlreadyRunning);
			}
			if inner.current != self.definition.idle() {
				return Err(MachineError::NotIdle(inner.current.to_string()));
			}
			seed(&mut inner.context);
			inner.running = true;
			inner.current = self.definition.entry();
			inner.progress = self
				.definition
				.descriptor(&inner.current)
				.map(|d| d.progress)
				.unwrap_or(0);
			inner.generation
		};

		tracing::debug!(workflow = self.definition.name(), "Starting workflow run");

		loop {
			let (state, context) = {
				let inner = self.lock();
				if inner.generation != generation {
					tracing::debug!(
						workflow = self.definition.name(),
						"Run superseded by reset, stopping"
					);
					return Ok(inner.current);
				}
				(inner.current, inner.context.clone())
			};

			let descriptor = match self.definition.descriptor(&state) {
				Some(descriptor) => descriptor.clone(),
				None => {
					return Ok(self.fail(
						generation,
						format!("state {} has no registry entry", state),
					));
				}
			};

			if let Some(guard) = &descriptor.guard {
				if !guard(&context) {
					return Ok(self.fail(
						generation,
						format!("cannot enter state {}: precondition not met", state),
					));
				}
			}

			if state == self.definition.error_state() {
				self.finish_run(generation);
				return Ok(state);
			}

			if state == self.definition.success() {
				// Terminal bookkeeping, such as matching a counterpart
				// order, runs here; its failure never leaves SUCCESS.
				if let Some(action) = descriptor.action.clone() {
					match action(context).await {
						Ok(outcome) => {
							let mut inner = self.lock();
							if inner.generation == generation {
								self.definition.apply(&mut inner.context, &outcome);
							}
						}
						Err(e) => {
							tracing::warn!(
								workflow = self.definition.name(),
								error = %e,
								"Finalize action failed; run stays successful"
							);
						}
					}
				}
				self.finish_run(generation);
				return Ok(state);
			}

			let action = match descriptor.action.clone() {
				Some(action) => action,
				None => {
					return Ok(self.fail(
						generation,
						format!("state {} has no action to run", state),
					));
				}
			};

			let result = action(context).await;

			let mut inner = self.lock();
			if inner.generation != generation {
				tracing::debug!(
					workflow = self.definition.name(),
					state = %state,
					"Discarding stale action result after reset"
				);
				return Ok(inner.current);
			}

			let outcome = match result {
				Ok(outcome) => outcome,
				Err(e) => {
					drop(inner);
					return Ok(self.fail(generation, e.to_string()));
				}
			};

			self.definition.apply(&mut inner.context, &outcome);

			let next = match self.definition.resolve(state, &outcome) {
				Some(next) => next,
				None => {
					drop(inner);
					return Ok(self.fail(
						generation,
						format!("no transition from {} for outcome {}", state, outcome.kind()),
					));
				}
			};

			if next != self.definition.error_state() && !self.definition.allows(state, next) {
				drop(inner);
				return Ok(self.fail(
					generation,
					format!("illegal transition from {} to {}", state, next),
				));
			}

			inner.current = next;
			inner.progress = self
				.definition
				.descriptor(&next)
				.map(|d| d.progress)
				.unwrap_or(inner.progress);
			tracing::debug!(
				workflow = self.definition.name(),
				from = %state,
				to = %next,
				progress = inner.progress,
				"State transition"
			);
		}
	}

	fn finish_run(&self, generation: u64) {
		let mut inner = self.lock();
		if inner.generation == generation {
			inner.running = false;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{StepDescriptor, StepError, WorkflowDefinition};
	use futures::FutureExt;
	use orderflow_types::{StepOutcome, U256};
	use std::fmt;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	enum TestState {
		Idle,
		Fetching,
		Success,
		Error,
	}

	impl fmt::Display for TestState {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			let name = match self {
				TestState::Idle => "IDLE",
				TestState::Fetching => "FETCHING_NONCE",
				TestState::Success => "SUCCESS",
				TestState::Error => "ERROR",
			};
			write!(f, "{}", name)
		}
	}

	#[derive(Debug, Clone, Default, PartialEq)]
	struct TestContext {
		nonce: Option<U256>,
		error_message: Option<String>,
	}

	fn resolve(state: TestState, outcome: &StepOutcome) -> Option<TestState> {
		match (state, outcome) {
			(TestState::Fetching, StepOutcome::NonceFetched { .. }) => Some(TestState::Success),
			_ => None,
		}
	}

	fn definition(
		fail: bool,
		guard_blocks: bool,
	) -> Arc<WorkflowDefinition<TestState, TestContext>> {
		let action = Arc::new(move |_context: TestContext| {
			async move {
				if fail {
					Err(StepError::Capability("nonce read failed".to_string()))
				} else {
					Ok(StepOutcome::NonceFetched { nonce: U256::ZERO })
				}
			}
			.boxed()
		});
		let mut fetching = StepDescriptor::active("Fetching nonce...", 50, action);
		if guard_blocks {
			fetching = fetching.with_guard(Arc::new(|_context: &TestContext| false));
		}

		let definition = WorkflowDefinition::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 0))
		.register(TestState::Fetching, fetching)
		.register(TestState::Success, StepDescriptor::passive("Done", 100))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.allow(TestState::Idle, vec![TestState::Fetching])
		.allow(
			TestState::Fetching,
			vec![TestState::Success, TestState::Error],
		)
		.resolver(resolve)
		.applier(|context: &mut TestContext, outcome| {
			if let StepOutcome::NonceFetched { nonce } = outcome {
				context.nonce = Some(*nonce);
			}
		})
		.error_setter(|context: &mut TestContext, message| {
			context.error_message = Some(message);
		})
		.build()
		.unwrap();

		Arc::new(definition)
	}

	#[tokio::test]
	async fn test_happy_path_reaches_success_with_full_progress() {
		let machine = Machine::new(definition(false, false));
		assert_eq!(machine.current_state(), TestState::Idle);

		let terminal = machine.start().await.unwrap();
		assert_eq!(terminal, TestState::Success);
		assert_eq!(machine.progress(), 100);
		assert_eq!(machine.context().nonce, Some(U256::ZERO));
		assert_eq!(machine.current_step_label(), "Done");
	}

	#[tokio::test]
	async fn test_action_failure_routes_to_error_with_message() {
		let machine = Machine::new(definition(true, false));
		let terminal = machine.start().await.unwrap();

		assert_eq!(terminal, TestState::Error);
		assert_eq!(machine.progress(), 0);
		let message = machine.context().error_message.unwrap();
		assert!(message.contains("nonce read failed"));
	}

	#[tokio::test]
	async fn test_guard_failure_routes_to_error() {
		let machine = Machine::new(definition(false, true));
		let terminal = machine.start().await.unwrap();

		assert_eq!(terminal, TestState::Error);
		let message = machine.context().error_message.unwrap();
		assert!(message.contains("precondition not met"));
	}

	#[tokio::test]
	async fn test_start_is_rejected_outside_idle() {
		let machine = Machine::new(definition(false, false));
		machine.start().await.unwrap();

		// Terminal state, not IDLE: a second start must be rejected.
		assert!(matches!(
			machine.start().await,
			Err(MachineError::NotIdle(_))
		));

		machine.reset();
		assert_eq!(machine.current_state(), TestState::Idle);
		assert_eq!(machine.start().await.unwrap(), TestState::Success);
	}

	#[tokio::test]
	async fn test_reset_is_idempotent() {
		let machine = Machine::new(definition(false, false));
		machine.start().await.unwrap();

		machine.reset();
		let after_one = (machine.current_state(), machine.context());
		machine.reset();
		assert_eq!((machine.current_state(), machine.context()), after_one);
		assert_eq!(machine.context(), TestContext::default());
	}

	#[tokio::test]
	async fn test_stale_action_result_is_discarded_after_reset() {
		static CALLS: AtomicU32 = AtomicU32::new(0);

		let action = Arc::new(|_context: TestContext| {
			async move {
				CALLS.fetch_add(1, Ordering::SeqCst);
				tokio::time::sleep(std::time::Duration::from_millis(50)).await;
				Ok::<_, StepError>(StepOutcome::NonceFetched { nonce: U256::from(9) })
			}
			.boxed()
		});

		let definition = WorkflowDefinition::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 0))
		.register(
			TestState::Fetching,
			StepDescriptor::active("Fetching nonce...", 50, action),
		)
		.register(TestState::Success, StepDescriptor::passive("Done", 100))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.allow(TestState::Idle, vec![TestState::Fetching])
		.allow(
			TestState::Fetching,
			vec![TestState::Success, TestState::Error],
		)
		.resolver(resolve)
		.applier(|context: &mut TestContext, outcome| {
			if let StepOutcome::NonceFetched { nonce } = outcome {
				context.nonce = Some(*nonce);
			}
		})
		.error_setter(|context: &mut TestContext, message| {
			context.error_message = Some(message);
		})
		.build()
		.unwrap();

		let machine = Machine::new(Arc::new(definition));
		assert_eq!(machine.generation(), 0);
		let runner = machine.clone();
		let handle = tokio::spawn(async move { runner.start().await });

		// Give the action time to be in flight, then reset under it.
		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		machine.reset();
		assert_eq!(machine.generation(), 1);

		let final_state = handle.await.unwrap().unwrap();
		assert_eq!(final_state, TestState::Idle);
		assert_eq!(machine.context().nonce, None);
		assert_eq!(CALLS.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_unresolved_outcome_routes_to_error() {
		let action = Arc::new(|_context: TestContext| {
			async move { Ok::<_, StepError>(StepOutcome::Validated) }.boxed()
		});

		let definition = WorkflowDefinition::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 0))
		.register(
			TestState::Fetching,
			StepDescriptor::active("Fetching nonce...", 50, action),
		)
		.register(TestState::Success, StepDescriptor::passive("Done", 100))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.allow(TestState::Idle, vec![TestState::Fetching])
		.allow(
			TestState::Fetching,
			vec![TestState::Success, TestState::Error],
		)
		.resolver(resolve)
		.applier(|_context: &mut TestContext, _outcome| {})
		.error_setter(|context: &mut TestContext, message| {
			context.error_message = Some(message);
		})
		.build()
		.unwrap();

		let machine = Machine::new(Arc::new(definition));
		assert_eq!(machine.start().await.unwrap(), TestState::Error);
		let message = machine.context().error_message.unwrap();
		assert!(message.contains("no transition"));
		assert!(message.contains("Validated"));
	}

	#[test]
	fn test_definition_validation_rejects_missing_descriptor() {
		let result = WorkflowDefinition::<TestState, TestContext>::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 0))
		.register(TestState::Success, StepDescriptor::passive("Done", 100))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.resolver(resolve)
		.applier(|_context: &mut TestContext, _outcome| {})
		.error_setter(|_context: &mut TestContext, _message| {})
		.build();

		assert!(matches!(
			result,
			Err(crate::DefinitionError::MissingDescriptor(_))
		));
	}

	#[test]
	fn test_definition_validation_rejects_decreasing_progress() {
		let result = WorkflowDefinition::<TestState, TestContext>::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 60))
		.register(
			TestState::Fetching,
			StepDescriptor::passive("Fetching nonce...", 50),
		)
		.register(TestState::Success, StepDescriptor::passive("Done", 100))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.allow(TestState::Idle, vec![TestState::Fetching])
		.resolver(resolve)
		.applier(|_context: &mut TestContext, _outcome| {})
		.error_setter(|_context: &mut TestContext, _message| {})
		.build();

		assert!(matches!(
			result,
			Err(crate::DefinitionError::DecreasingProgress { .. })
		));
	}

	#[test]
	fn test_definition_validation_rejects_wrong_terminal_progress() {
		let result = WorkflowDefinition::<TestState, TestContext>::builder(
			"test",
			TestState::Idle,
			TestState::Fetching,
			TestState::Success,
			TestState::Error,
		)
		.register(TestState::Idle, StepDescriptor::passive("Idle", 0))
		.register(
			TestState::Fetching,
			StepDescriptor::passive("Fetching nonce...", 50),
		)
		.register(TestState::Success, StepDescriptor::passive("Done", 90))
		.register(TestState::Error, StepDescriptor::passive("Failed", 0))
		.resolver(resolve)
		.applier(|_context: &mut TestContext, _outcome| {})
		.error_setter(|_context: &mut TestContext, _message| {})
		.build();

		assert!(matches!(
			result,
			Err(crate::DefinitionError::TerminalProgress { .. })
		));
	}
}
