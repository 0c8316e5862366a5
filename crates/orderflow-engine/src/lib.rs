//! Generic workflow state machine engine.
//!
//! This crate provides the parameterized machinery the concrete order
//! workflows instantiate: a per-state registry of labels, progress values,
//! actions and guards; a validated transition table; a pure transition
//! resolver over tagged step outcomes; and the machine runner that drives
//! a context-carrying run from IDLE to SUCCESS or ERROR.
//!
//! The engine knows nothing about orders or chains. Workflows inject
//! their capabilities into step action closures and describe themselves
//! with a [`WorkflowDefinition`].

pub mod definition;
pub mod error;
pub mod machine;
pub mod registry;

pub use definition::{
	ContextApplier, ErrorSetter, TransitionResolver, WorkflowDefinition,
	WorkflowDefinitionBuilder,
};
pub use error::{DefinitionError, MachineError, StepError};
pub use machine::Machine;
pub use registry::{StateRegistry, StepAction, StepDescriptor, StepGuard};
