//! Trait abstractions for the collaborators the engine drives
//!
//! These traits enable testing the runtime with mock implementations.

use crate::state_machine::{Event, RecruitContext, RecruitState};
use async_trait::async_trait;
use std::sync::Arc;

/// A conversation as known to the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHandle {
    pub id: String,
    /// Display name, used to label log lines
    pub name: Option<String>,
}

/// Lookup of conversations on the chat platform
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    /// `Ok(None)` when the conversation no longer exists
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String>;
}

/// Performs the user-facing effect of entering a state
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Render the state's form or call the service behind it.
    ///
    /// May return a follow-up event (e.g. `VERIFIED` once a verification
    /// call succeeds). An `Err` becomes the state's `<state>_ERROR` event.
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationTransport + ?Sized> ConversationTransport for Arc<T> {
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String> {
        (**self).resolve_conversation(conversation_id).await
    }
}

#[async_trait]
impl<T: ActionDispatcher + ?Sized> ActionDispatcher for Arc<T> {
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, String> {
        (**self).on_state_entered(conversation_id, state, context).await
    }
}
