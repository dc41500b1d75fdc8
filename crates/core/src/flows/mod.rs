pub mod engine;
pub mod states;

pub use engine::{ContactFlow, FlowDefinition, FlowEngine, FlowTransitionError, MAX_SEND_ATTEMPTS};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};
