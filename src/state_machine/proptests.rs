//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::backup::Snapshot;
use crate::runtime::{DispatchOutcome, Notification, SessionRegistry};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_track() -> impl Strategy<Value = Track> {
    prop_oneof![Just(Track::Short), Just(Track::Long)]
}

fn arb_flow() -> impl Strategy<Value = FlowDefinition> {
    (1u32..5).prop_map(FlowDefinition::new)
}

/// Every state a session can rest in
fn arb_resting_state() -> impl Strategy<Value = RecruitState> {
    prop::sample::select(
        RecruitState::ALL
            .iter()
            .copied()
            .filter(|s| !s.is_transient())
            .collect::<Vec<_>>(),
    )
}

fn arb_context(flow: FlowDefinition) -> impl Strategy<Value = RecruitContext> {
    (
        prop::option::of(arb_track()),
        prop::option::of("[a-z0-9]{1,8}"),
        prop::option::of("[A-Za-z]{1,12}"),
        prop::option::of("[a-z]{1,8}"),
        0..=flow.max_agreements(),
        any::<bool>(),
    )
        .prop_map(
            |(track, principal_id, principal_name, referral_route, agreement_count, suppress)| {
                RecruitContext {
                    track,
                    principal_id,
                    principal_name,
                    referral_route,
                    agreement_count,
                    suppress_next_notification: suppress,
                }
            },
        )
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Start),
        arb_track().prop_map(|track| Event::TrackSelected { track }),
        ("[A-Za-z]{1,12}", "[a-z0-9]{1,8}")
            .prop_map(|(name, id)| Event::IdentitySubmitted { name, id }),
        Just(Event::PrerequisitesConfirmed),
        "[a-z]{1,8}".prop_map(|route| Event::RouteSelected { route }),
        Just(Event::TermAgreed),
        Just(Event::TermAgreed),
        Just(Event::Verified),
        Just(Event::OperatorNotified),
        prop::sample::select(RecruitState::ALL.to_vec()).prop_map(Event::failed),
        Just(Event::ClearSuppression),
    ]
}

fn arb_flow_and_context() -> impl Strategy<Value = (FlowDefinition, RecruitContext)> {
    arb_flow().prop_flat_map(|flow| (Just(flow), arb_context(flow)))
}

fn recording_registry(flow: FlowDefinition) -> (SessionRegistry, Arc<Mutex<Vec<Notification>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let registry = SessionRegistry::new(flow).with_subscriber(Arc::new(move |n: &Notification| {
        sink.lock().unwrap().push(n.clone());
    }));
    (registry, seen)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_transition_is_deterministic(
        (flow, ctx) in arb_flow_and_context(),
        state in arb_resting_state(),
        event in arb_event(),
    ) {
        let first = transition(state, &flow, &ctx, event.clone());
        let second = transition(state, &flow, &ctx, event);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_transient_state_never_entered(
        (flow, ctx) in arb_flow_and_context(),
        state in arb_resting_state(),
        event in arb_event(),
    ) {
        if let Ok(result) = transition(state, &flow, &ctx, event) {
            prop_assert!(!result.new_state.is_transient());
        }
    }

    #[test]
    fn prop_completed_accepts_nothing(
        (flow, ctx) in arb_flow_and_context(),
        event in arb_event(),
    ) {
        prop_assert!(transition(RecruitState::Completed, &flow, &ctx, event).is_err());
    }

    #[test]
    fn prop_error_edges_set_suppression(
        (flow, ctx) in arb_flow_and_context(),
        state in arb_resting_state(),
    ) {
        match transition(state, &flow, &ctx, Event::failed(state)) {
            Ok(result) => {
                prop_assert!(result.context.suppress_next_notification);
                prop_assert_eq!(Some(result.new_state), recovery_target(state, ctx.track));
                prop_assert_eq!(result.context.agreement_count, ctx.agreement_count);
            }
            Err(_) => {
                prop_assert_eq!(recovery_target(state, ctx.track), None);
            }
        }
    }

    #[test]
    fn prop_error_for_other_state_is_inapplicable(
        (flow, ctx) in arb_flow_and_context(),
        state in arb_resting_state(),
        other in arb_resting_state(),
    ) {
        prop_assume!(state != other);
        prop_assert!(transition(state, &flow, &ctx, Event::failed(other)).is_err());
    }

    #[test]
    fn prop_inapplicable_event_changes_nothing(
        flow in arb_flow(),
        events in prop::collection::vec(arb_event(), 0..30),
        probe in arb_event(),
    ) {
        let (registry, seen) = recording_registry(flow);
        registry.start("c-1", None).unwrap();
        for event in events {
            let _ = registry.dispatch("c-1", event);
        }

        let before = registry.get("c-1").unwrap();
        let notified = seen.lock().unwrap().len();
        let outcome = registry.dispatch("c-1", probe).unwrap();

        if outcome == DispatchOutcome::Ignored {
            prop_assert_eq!(registry.get("c-1").unwrap(), before);
            prop_assert_eq!(seen.lock().unwrap().len(), notified);
        }
    }

    #[test]
    fn prop_agreement_count_bounded_and_monotonic(
        flow in arb_flow(),
        events in prop::collection::vec(arb_event(), 0..60),
    ) {
        let (registry, seen) = recording_registry(flow);
        registry.start("c-1", None).unwrap();

        let mut last = 0;
        for event in events {
            let _ = registry.dispatch("c-1", event);
            let count = registry.get("c-1").unwrap().context.agreement_count;
            prop_assert!(count <= flow.max_agreements());
            prop_assert!(count >= last);
            last = count;
        }

        for notification in seen.lock().unwrap().iter() {
            prop_assert!(!notification.state.is_transient());
            prop_assert!(notification.context.agreement_count <= flow.max_agreements());
        }
    }

    #[test]
    fn prop_restored_session_matches_snapshot(
        (flow, ctx) in arb_flow_and_context(),
        state in arb_resting_state(),
    ) {
        prop_assume!(!state.is_terminal());
        let snapshot = Snapshot::new(state, ctx);
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();

        let (registry, seen) = recording_registry(flow);
        let info = registry.restore("c-1", parsed, None).unwrap();

        prop_assert_eq!(info.state, snapshot.state);
        prop_assert_eq!(info.context, snapshot.context);
        prop_assert!(seen.lock().unwrap().is_empty());
    }
}
