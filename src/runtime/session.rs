//! One running state machine bound to a conversation

use crate::backup::Snapshot;
use crate::state_machine::{transition, Event, FlowDefinition, RecruitContext, RecruitState};
use serde::Serialize;
use std::sync::Arc;

/// Delivered to subscribers after every committed transition
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub conversation_id: String,
    /// Identifies the session instance, so late callbacks can be recognised
    pub generation: u64,
    pub state: RecruitState,
    pub context: RecruitContext,
}

/// Synchronous state-change callback.
///
/// Invoked while the registry is locked: it must not call back into the
/// registry. Hand the notification off to a channel instead.
pub type Subscriber = Arc<dyn Fn(&Notification) + Send + Sync>;

/// What happened to an event handed to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "state", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A state was entered and subscribers were notified
    Transitioned(RecruitState),
    /// Context changed without entering a state (no notification)
    ContextUpdated,
    /// Event not applicable to the current state
    Ignored,
    /// The session the event was meant for no longer exists
    Stale,
}

impl DispatchOutcome {
    pub fn transitioned(self) -> bool {
        matches!(self, DispatchOutcome::Transitioned(_))
    }
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub conversation_id: String,
    pub label: Option<String>,
    pub generation: u64,
    pub state: RecruitState,
    pub context: RecruitContext,
}

pub struct Session {
    conversation_id: String,
    label: Option<String>,
    generation: u64,
    flow: FlowDefinition,
    state: RecruitState,
    context: RecruitContext,
    subscribers: Vec<Subscriber>,
}

impl Session {
    /// Fresh session in the initial state
    pub fn new(
        conversation_id: impl Into<String>,
        generation: u64,
        flow: FlowDefinition,
        context: RecruitContext,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            label: None,
            generation,
            flow,
            state: RecruitState::Idle,
            context,
            subscribers: Vec::new(),
        }
    }

    /// Rebuild a session directly in a recorded state, replaying nothing
    pub fn from_snapshot(
        conversation_id: impl Into<String>,
        generation: u64,
        flow: FlowDefinition,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            state: snapshot.state,
            ..Self::new(conversation_id, generation, flow, snapshot.context)
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> RecruitState {
        self.state
    }

    pub fn context(&self) -> &RecruitContext {
        &self.context
    }

    /// Label for logs: the conversation's display name when known
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.conversation_id)
    }

    /// Apply one event. Inapplicable events leave the session untouched.
    pub fn send(&mut self, event: Event) -> DispatchOutcome {
        let event_name = event.name();
        let result = match transition(self.state, &self.flow, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(
                    conv_id = %self.conversation_id,
                    state = %self.state,
                    event = %event_name,
                    error = %e,
                    "Ignoring inapplicable event"
                );
                return DispatchOutcome::Ignored;
            }
        };

        // Commit state and context together before anyone observes them
        self.state = result.new_state;
        self.context = result.context;

        if !result.notify {
            tracing::debug!(
                conv_id = %self.conversation_id,
                state = %self.state,
                event = %event_name,
                "Context updated"
            );
            return DispatchOutcome::ContextUpdated;
        }

        tracing::info!(
            conv_id = %self.conversation_id,
            name = %self.display_name(),
            state = %self.state,
            event = %event_name,
            "Recruit session state changed"
        );
        tracing::debug!(
            conv_id = %self.conversation_id,
            context = ?self.context,
            "Recruit session context"
        );

        let notification = Notification {
            conversation_id: self.conversation_id.clone(),
            generation: self.generation,
            state: self.state,
            context: self.context.clone(),
        };
        for subscriber in &self.subscribers {
            subscriber(&notification);
        }

        DispatchOutcome::Transitioned(self.state)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.state, self.context.clone())
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            conversation_id: self.conversation_id.clone(),
            label: self.label.clone(),
            generation: self.generation,
            state: self.state,
            context: self.context.clone(),
        }
    }
}
