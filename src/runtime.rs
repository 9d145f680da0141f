//! Runtime for recruitment sessions
//!
//! Sessions live in a single `SessionRegistry`. Committed transitions are
//! handed to the `EffectRunner`, which performs the user-facing effect and
//! reports the outcome back as a new event.

mod effects;
mod registry;
mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use effects::{handle_notification, notification_channel, EffectReport, EffectRunner};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{DispatchOutcome, Notification, Session, SessionInfo, Subscriber};
pub use traits::*;
