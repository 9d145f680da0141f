//! Core recruitment state machine
//!
//! Pure, side-effect-free description of the conversation flow: states,
//! events, guards and context-mutating actions. No I/O happens here.

pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use event::{Event, EventParseError};
pub use state::{ContextOverrides, RecruitContext, RecruitState, Track};
pub use transition::{
    recovery_target, transition, FlowDefinition, TransitionError, TransitionResult,
};
