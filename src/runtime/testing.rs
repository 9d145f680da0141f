//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::backup::{Artifact, ArtifactId, BackupStore};
use crate::state_machine::{Event, RecruitContext, RecruitState};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Scripted Action Dispatcher
// ============================================================================

/// Dispatcher with per-state scripted behaviour.
///
/// States without a script succeed with no follow-up event.
#[derive(Default)]
pub struct ScriptedDispatcher {
    failing: HashSet<RecruitState>,
    stalling: HashSet<RecruitState>,
    delays: HashMap<RecruitState, Duration>,
    responses: HashMap<RecruitState, Event>,
    /// Record of every effect attempted, in order
    calls: Mutex<Vec<(String, RecruitState)>>,
    /// Effects that ran to the end, in the order they finished
    finished: Mutex<Vec<(String, RecruitState)>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effects for `state` return an error
    #[must_use]
    pub fn fail_on(mut self, state: RecruitState) -> Self {
        self.failing.insert(state);
        self
    }

    /// Effects for `state` never finish
    #[must_use]
    pub fn stall_on(mut self, state: RecruitState) -> Self {
        self.stalling.insert(state);
        self
    }

    /// Effects for `state` take `delay` before finishing
    #[must_use]
    pub fn delay_on(mut self, state: RecruitState, delay: Duration) -> Self {
        self.delays.insert(state, delay);
        self
    }

    /// Effects for `state` succeed and produce `event`
    #[must_use]
    pub fn respond(mut self, state: RecruitState, event: Event) -> Self {
        self.responses.insert(state, event);
        self
    }

    pub fn rendered(&self) -> Vec<(String, RecruitState)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(String, RecruitState)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionDispatcher for ScriptedDispatcher {
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        _context: &RecruitContext,
    ) -> Result<Option<Event>, String> {
        self.calls
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), state));

        if self.stalling.contains(&state) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(delay) = self.delays.get(&state) {
            tokio::time::sleep(*delay).await;
        }
        self.finished
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), state));

        if self.failing.contains(&state) {
            return Err(format!("scripted failure in {state}"));
        }
        Ok(self.responses.get(&state).cloned())
    }
}

// ============================================================================
// Static Conversation Transport
// ============================================================================

/// Transport that knows a fixed set of conversations
pub struct StaticTransport {
    /// `None` resolves every id
    known: Option<HashMap<String, String>>,
}

impl StaticTransport {
    pub fn all() -> Self {
        Self { known: None }
    }

    /// Only the listed `(id, name)` pairs resolve
    pub fn only(conversations: &[(&str, &str)]) -> Self {
        Self {
            known: Some(
                conversations
                    .iter()
                    .map(|(id, name)| ((*id).to_string(), (*name).to_string()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ConversationTransport for StaticTransport {
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String> {
        let handle = match &self.known {
            None => Some(ConversationHandle {
                id: conversation_id.to_string(),
                name: None,
            }),
            Some(known) => known.get(conversation_id).map(|name| ConversationHandle {
                id: conversation_id.to_string(),
                name: Some(name.clone()),
            }),
        };
        Ok(handle)
    }
}

// ============================================================================
// In-Memory Backup Store
// ============================================================================

/// Append-only artifact list held in memory
#[derive(Default)]
pub struct InMemoryBackupStore {
    artifacts: Mutex<Vec<Artifact>>,
    next_id: Mutex<ArtifactId>,
    fail_writes: AtomicBool,
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stored payloads, oldest first
    pub fn payloads(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.payload.clone())
            .collect()
    }
}

#[async_trait]
impl BackupStore for InMemoryBackupStore {
    async fn write(&self, payload: &str) -> Result<ArtifactId, String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("store unavailable".to_string());
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.artifacts.lock().unwrap().push(Artifact {
            id,
            payload: payload.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Artifact>, String> {
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), String> {
        self.artifacts.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_lists_newest_first() {
        let store = InMemoryBackupStore::new();
        let first = store.write("one").await.unwrap();
        let second = store.write("two").await.unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second, first]);

        store.delete(second).await.unwrap();
        assert_eq!(store.payloads(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_static_transport_resolution() {
        let transport = StaticTransport::only(&[("c-1", "recruit-ayla")]);
        let handle = transport.resolve_conversation("c-1").await.unwrap().unwrap();
        assert_eq!(handle.name.as_deref(), Some("recruit-ayla"));
        assert!(transport.resolve_conversation("c-2").await.unwrap().is_none());
        assert!(StaticTransport::all().resolve_conversation("c-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scripted_dispatcher() {
        let dispatcher = ScriptedDispatcher::new()
            .fail_on(RecruitState::SelectingTrack)
            .respond(RecruitState::VerifyingExternalAccount, Event::Verified);
        let ctx = RecruitContext::default();

        assert!(dispatcher
            .on_state_entered("c", RecruitState::SelectingTrack, &ctx)
            .await
            .is_err());
        assert_eq!(
            dispatcher
                .on_state_entered("c", RecruitState::VerifyingExternalAccount, &ctx)
                .await,
            Ok(Some(Event::Verified))
        );
        assert_eq!(dispatcher.rendered().len(), 2);
    }
}
