//! Registry of live recruitment sessions
//!
//! The only mutable shared structure. One mutex guards the whole map;
//! session-internal logic is already serialized by construction.

use super::session::{DispatchOutcome, Session, SessionInfo, Subscriber};
use crate::backup::snapshot::{validate_context, SnapshotError};
use crate::backup::Snapshot;
use crate::state_machine::{ContextOverrides, Event, FlowDefinition, RecruitContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("No active recruit session for conversation {0}")]
    NoActiveSession(String),
    #[error("Recruit session already exists for conversation {0}")]
    SessionExists(String),
    #[error("Invalid session data: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
}

#[derive(Default)]
struct Sessions {
    by_conversation: HashMap<String, Session>,
    next_generation: u64,
}

impl Sessions {
    fn allocate_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

pub struct SessionRegistry {
    flow: FlowDefinition,
    subscribers: Vec<Subscriber>,
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new(flow: FlowDefinition) -> Self {
        Self {
            flow,
            subscribers: Vec::new(),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Attach a subscriber to every session this registry starts or restores
    #[must_use]
    pub fn with_subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        // A panicking subscriber must not take every conversation down with it
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, sessions: &mut Sessions, mut session: Session) -> SessionInfo {
        for subscriber in &self.subscribers {
            session.subscribe(subscriber.clone());
        }
        let info = session.info();
        sessions
            .by_conversation
            .insert(session.conversation_id().to_string(), session);
        info
    }

    /// Create a fresh session in the initial state. No transition is taken.
    ///
    /// # Errors
    ///
    /// `SessionExists` if the conversation already has a session,
    /// `InvalidSnapshot` if the overrides produce an invalid context.
    pub fn start(
        &self,
        conversation_id: &str,
        overrides: Option<ContextOverrides>,
    ) -> Result<SessionInfo, RegistryError> {
        let context = overrides
            .map(|o| o.apply(RecruitContext::default()))
            .unwrap_or_default();
        validate_context(&context, &self.flow)?;

        let mut sessions = self.lock();
        if sessions.by_conversation.contains_key(conversation_id) {
            return Err(RegistryError::SessionExists(conversation_id.to_string()));
        }

        let generation = sessions.allocate_generation();
        let session = Session::new(conversation_id, generation, self.flow, context);
        tracing::info!(conv_id = %conversation_id, generation, "Recruit session started");
        Ok(self.register(&mut sessions, session))
    }

    /// Rebuild a session in its recorded state without replaying events
    ///
    /// # Errors
    ///
    /// `SessionExists` if the conversation already has a session,
    /// `InvalidSnapshot` if the snapshot does not fit this flow.
    pub fn restore(
        &self,
        conversation_id: &str,
        snapshot: Snapshot,
        label: Option<String>,
    ) -> Result<SessionInfo, RegistryError> {
        snapshot.validate(&self.flow)?;

        let mut sessions = self.lock();
        if sessions.by_conversation.contains_key(conversation_id) {
            return Err(RegistryError::SessionExists(conversation_id.to_string()));
        }

        let generation = sessions.allocate_generation();
        let state = snapshot.state;
        let session = Session::from_snapshot(conversation_id, generation, self.flow, snapshot)
            .with_label(label);
        tracing::info!(
            conv_id = %conversation_id,
            name = %session.display_name(),
            state = %state,
            generation,
            "Recruit session restored"
        );
        Ok(self.register(&mut sessions, session))
    }

    pub fn get(&self, conversation_id: &str) -> Option<SessionInfo> {
        self.lock().by_conversation.get(conversation_id).map(Session::info)
    }

    /// Every live session, ordered by conversation id
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self
            .lock()
            .by_conversation
            .values()
            .map(Session::info)
            .collect();
        sessions.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        sessions
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.lock().by_conversation.contains_key(conversation_id)
    }

    /// Forward an event to a session; subscribers run before this returns
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if the conversation has no session.
    pub fn dispatch(
        &self,
        conversation_id: &str,
        event: Event,
    ) -> Result<DispatchOutcome, RegistryError> {
        let mut sessions = self.lock();
        let session = sessions
            .by_conversation
            .get_mut(conversation_id)
            .ok_or_else(|| RegistryError::NoActiveSession(conversation_id.to_string()))?;
        Ok(session.send(event))
    }

    /// Like `dispatch`, for callbacks of effects started by a particular session.
    ///
    /// If that session was ended (or replaced) meanwhile, the event is dropped.
    pub fn dispatch_if_current(
        &self,
        conversation_id: &str,
        generation: u64,
        event: Event,
    ) -> DispatchOutcome {
        let mut sessions = self.lock();
        match sessions.by_conversation.get_mut(conversation_id) {
            Some(session) if session.generation() == generation => session.send(event),
            _ => {
                tracing::debug!(
                    conv_id = %conversation_id,
                    generation,
                    event = %event,
                    "Dropping late callback for ended session"
                );
                DispatchOutcome::Stale
            }
        }
    }

    /// One snapshot per session not in the terminal state
    pub fn active_snapshots(&self) -> BTreeMap<String, Snapshot> {
        self.lock()
            .by_conversation
            .iter()
            .filter(|(_, session)| !session.state().is_terminal())
            .map(|(id, session)| (id.clone(), session.snapshot()))
            .collect()
    }

    /// Remove a session. Idempotent; returns whether one was removed.
    pub fn end(&self, conversation_id: &str) -> bool {
        let removed = self.lock().by_conversation.remove(conversation_id);
        if let Some(session) = &removed {
            tracing::info!(
                conv_id = %conversation_id,
                name = %session.display_name(),
                state = %session.state(),
                "Recruit session ended"
            );
        }
        removed.is_some()
    }

    /// End a session only if it is still the instance identified by `generation`
    pub fn end_if_current(&self, conversation_id: &str, generation: u64) -> bool {
        let mut sessions = self.lock();
        let current = sessions
            .by_conversation
            .get(conversation_id)
            .is_some_and(|s| s.generation() == generation);
        if current {
            sessions.by_conversation.remove(conversation_id);
            tracing::info!(conv_id = %conversation_id, generation, "Recruit session finished");
        }
        current
    }

    pub fn len(&self) -> usize {
        self.lock().by_conversation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::session::Notification;
    use crate::state_machine::{RecruitState, Track};
    use std::sync::Arc;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(FlowDefinition::new(2))
    }

    fn long_snapshot(state: RecruitState) -> Snapshot {
        Snapshot::new(
            state,
            RecruitContext {
                track: Some(Track::Long),
                principal_id: Some("9001".to_string()),
                principal_name: Some("Ayla".to_string()),
                ..RecruitContext::default()
            },
        )
    }

    #[test]
    fn test_start_registers_idle_session() {
        let registry = registry();
        let info = registry.start("c-1", None).unwrap();

        assert_eq!(info.state, RecruitState::Idle);
        assert_eq!(registry.get("c-1").unwrap().state, RecruitState::Idle);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_start_twice_fails() {
        let registry = registry();
        registry.start("c-1", None).unwrap();

        assert_eq!(
            registry.start("c-1", None),
            Err(RegistryError::SessionExists("c-1".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_start_applies_overrides() {
        let registry = registry();
        let info = registry
            .start(
                "c-1",
                Some(ContextOverrides {
                    referral_route: Some("forum".to_string()),
                    ..ContextOverrides::default()
                }),
            )
            .unwrap();
        assert_eq!(info.context.referral_route.as_deref(), Some("forum"));
    }

    #[test]
    fn test_start_rejects_out_of_range_overrides() {
        let registry = registry();
        let result = registry.start(
            "c-1",
            Some(ContextOverrides {
                agreement_count: Some(5),
                ..ContextOverrides::default()
            }),
        );
        assert!(matches!(result, Err(RegistryError::InvalidSnapshot(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_unknown_conversation() {
        let registry = registry();
        assert_eq!(
            registry.dispatch("missing", Event::Start),
            Err(RegistryError::NoActiveSession("missing".to_string()))
        );
    }

    #[test]
    fn test_inapplicable_is_distinct_from_missing_session() {
        let registry = registry();
        registry.start("c-1", None).unwrap();

        assert_eq!(registry.dispatch("c-1", Event::Verified), Ok(DispatchOutcome::Ignored));
        assert!(matches!(
            registry.dispatch("c-2", Event::Verified),
            Err(RegistryError::NoActiveSession(_))
        ));
    }

    #[test]
    fn test_registry_subscribers_see_every_session() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let registry = registry().with_subscriber(Arc::new(move |n: &Notification| {
            sink.lock().unwrap().push((n.conversation_id.clone(), n.state));
        }));

        registry.start("c-1", None).unwrap();
        registry
            .restore("c-2", long_snapshot(RecruitState::CheckingPrerequisites), None)
            .unwrap();
        registry.dispatch("c-1", Event::Start).unwrap();
        registry.dispatch("c-2", Event::PrerequisitesConfirmed).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("c-1".to_string(), RecruitState::SelectingTrack),
                ("c-2".to_string(), RecruitState::SelectingReferralRoute),
            ]
        );
    }

    #[test]
    fn test_restore_round_trip() {
        let registry = registry();
        let snapshot = long_snapshot(RecruitState::AgreeingTerms);
        let info = registry
            .restore("c-1", snapshot.clone(), Some("recruit-ayla".to_string()))
            .unwrap();

        assert_eq!(info.state, snapshot.state);
        assert_eq!(info.context, snapshot.context);
        assert_eq!(info.label.as_deref(), Some("recruit-ayla"));
        assert_eq!(registry.active_snapshots()["c-1"], snapshot);
    }

    #[test]
    fn test_restore_refuses_live_conversation() {
        let registry = registry();
        registry.start("c-1", None).unwrap();
        assert_eq!(
            registry.restore("c-1", long_snapshot(RecruitState::SelectingTrack), None),
            Err(RegistryError::SessionExists("c-1".to_string()))
        );
    }

    #[test]
    fn test_active_snapshots_exclude_terminal() {
        let registry = registry();
        registry
            .restore("c-live", long_snapshot(RecruitState::VerifyingExternalAccount), None)
            .unwrap();
        registry
            .restore("c-done", long_snapshot(RecruitState::NotifyingOperator), None)
            .unwrap();
        registry.dispatch("c-done", Event::OperatorNotified).unwrap();

        let snapshots = registry.active_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.contains_key("c-live"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_end_is_idempotent() {
        let registry = registry();
        registry.start("c-1", None).unwrap();

        assert!(registry.end("c-1"));
        assert!(!registry.end("c-1"));
        assert!(registry.get("c-1").is_none());
    }

    #[test]
    fn test_late_callback_after_end_is_dropped() {
        let registry = registry();
        let first = registry.start("c-1", None).unwrap();
        registry.dispatch("c-1", Event::Start).unwrap();
        registry.end("c-1");

        assert_eq!(
            registry.dispatch_if_current(
                "c-1",
                first.generation,
                Event::failed(RecruitState::SelectingTrack)
            ),
            DispatchOutcome::Stale
        );

        // A new session under the same id must not receive the old callback either
        let second = registry.start("c-1", None).unwrap();
        assert_ne!(first.generation, second.generation);
        registry.dispatch("c-1", Event::Start).unwrap();
        assert_eq!(
            registry.dispatch_if_current(
                "c-1",
                first.generation,
                Event::failed(RecruitState::SelectingTrack)
            ),
            DispatchOutcome::Stale
        );
        assert_eq!(registry.get("c-1").unwrap().state, RecruitState::SelectingTrack);
        assert!(!registry.end_if_current("c-1", first.generation));
        assert!(registry.end_if_current("c-1", second.generation));
    }

    #[test]
    fn test_one_session_per_conversation_under_contention() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.start("c-race", None).is_ok())
            })
            .collect();

        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(started, 1);
        assert_eq!(registry.len(), 1);
    }
}
