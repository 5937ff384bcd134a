//! Conversation status state machine
//!
//! Pure transitions in the Elm Architecture style: `transition` decides the
//! next status and the effects to apply, `lifecycle::Lifecycle` applies them
//! atomically.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvStatus};
pub use transition::{transition, TransitionError, TransitionResult};
