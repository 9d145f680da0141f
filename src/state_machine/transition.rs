//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! result. Guards are total over `(context, event)` and actions only assign
//! context fields; all I/O happens after a transition commits.

use super::{Event, RecruitContext, RecruitState, Track};
use thiserror::Error;

const DEFAULT_TOTAL_TERMS: u32 = 2;

/// Immutable flow configuration shared by every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowDefinition {
    total_terms: u32,
}

impl FlowDefinition {
    /// At least one term is always presented on the long track
    pub fn new(total_terms: u32) -> Self {
        Self {
            total_terms: total_terms.max(1),
        }
    }

    pub fn total_terms(&self) -> u32 {
        self.total_terms
    }

    /// Upper bound of `agreement_count`
    pub fn max_agreements(&self) -> u32 {
        self.total_terms - 1
    }

    fn needs_more(&self, context: &RecruitContext) -> bool {
        context.agreement_count < self.max_agreements()
    }

    fn has_agreed_all(&self, context: &RecruitContext) -> bool {
        context.agreement_count >= self.max_agreements()
    }
}

impl Default for FlowDefinition {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_TERMS)
    }
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub new_state: RecruitState,
    pub context: RecruitContext,
    /// Whether subscribers observe this commit as entering `new_state`
    pub notify: bool,
}

impl TransitionResult {
    fn enter(state: RecruitState, context: RecruitContext) -> Self {
        Self {
            new_state: state,
            context,
            notify: true,
        }
    }

    fn silent(state: RecruitState, context: RecruitContext) -> Self {
        Self {
            new_state: state,
            context,
            notify: false,
        }
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("event {event} is not applicable in state {state}")]
    Inapplicable { state: RecruitState, event: String },
}

/// Pure transition function
pub fn transition(
    state: RecruitState,
    flow: &FlowDefinition,
    context: &RecruitContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let inapplicable = |event: &Event| TransitionError::Inapplicable {
        state,
        event: event.name(),
    };

    match (state, event) {
        // Flag bookkeeping, no state change and no notification
        (s, Event::ClearSuppression) if !s.is_terminal() && !s.is_transient() => {
            let mut ctx = context.clone();
            ctx.suppress_next_notification = false;
            Ok(TransitionResult::silent(s, ctx))
        }

        // ============================================================
        // Forward edges
        // ============================================================
        (RecruitState::Idle, Event::Start) => Ok(advance(RecruitState::SelectingTrack, context)),

        (RecruitState::SelectingTrack, Event::TrackSelected { track }) => {
            let mut result = advance(RecruitState::EnteringIdentity, context);
            result.context.track = Some(track);
            Ok(result)
        }

        (RecruitState::EnteringIdentity, Event::IdentitySubmitted { name, id }) => {
            let mut ctx = settled_context(context);
            ctx.principal_id = Some(id);
            ctx.principal_name = Some(name);
            // identityValidated branches immediately; subscribers only see where it lands
            let target = settle_identity(&ctx).ok_or_else(|| TransitionError::Inapplicable {
                state,
                event: "IDENTITY_SUBMITTED".to_string(),
            })?;
            Ok(TransitionResult::enter(target, ctx))
        }

        (RecruitState::CheckingPrerequisites, Event::PrerequisitesConfirmed) => {
            Ok(advance(RecruitState::SelectingReferralRoute, context))
        }

        (RecruitState::SelectingReferralRoute, Event::RouteSelected { route }) => {
            let mut result = advance(RecruitState::AgreeingTerms, context);
            result.context.referral_route = Some(route);
            Ok(result)
        }

        (RecruitState::AgreeingTerms, Event::TermAgreed) if flow.needs_more(context) => {
            let mut result = advance(RecruitState::AgreeingTerms, context);
            result.context.agreement_count += 1;
            Ok(result)
        }

        (RecruitState::AgreeingTerms, Event::TermAgreed) if flow.has_agreed_all(context) => {
            Ok(advance(RecruitState::VerifyingExternalAccount, context))
        }

        (RecruitState::VerifyingExternalAccount, Event::Verified) => {
            Ok(advance(RecruitState::NotifyingOperator, context))
        }

        (RecruitState::NotifyingOperator, Event::OperatorNotified) => {
            Ok(advance(RecruitState::Completed, context))
        }

        // ============================================================
        // Error-recovery edges
        // ============================================================
        (current, Event::ActionFailed { state: failed }) if failed == current => {
            let target = recovery_target(current, context.track)
                .ok_or_else(|| inapplicable(&Event::failed(failed)))?;
            let mut ctx = context.clone();
            ctx.suppress_next_notification = true;
            Ok(TransitionResult::enter(target, ctx))
        }

        (_, event) => Err(inapplicable(&event)),
    }
}

/// Where a `<state>_ERROR` event sends the session, if `state` has an error edge
pub fn recovery_target(state: RecruitState, track: Option<Track>) -> Option<RecruitState> {
    match state {
        RecruitState::SelectingTrack => Some(RecruitState::Idle),
        RecruitState::EnteringIdentity => Some(RecruitState::SelectingTrack),
        RecruitState::CheckingPrerequisites => Some(RecruitState::EnteringIdentity),
        RecruitState::SelectingReferralRoute => Some(RecruitState::CheckingPrerequisites),
        RecruitState::AgreeingTerms => Some(RecruitState::SelectingReferralRoute),
        RecruitState::VerifyingExternalAccount => match track? {
            Track::Long => Some(RecruitState::AgreeingTerms),
            Track::Short => Some(RecruitState::EnteringIdentity),
        },
        RecruitState::NotifyingOperator => Some(RecruitState::VerifyingExternalAccount),
        RecruitState::Idle | RecruitState::IdentityValidated | RecruitState::Completed => None,
    }
}

/// Guards of the `identityValidated` pseudo-state, evaluated short then long
fn settle_identity(context: &RecruitContext) -> Option<RecruitState> {
    match context.track {
        Some(Track::Short) => Some(RecruitState::VerifyingExternalAccount),
        Some(Track::Long) => Some(RecruitState::CheckingPrerequisites),
        None => None,
    }
}

/// A forward edge means any earlier fallback notification was already delivered
fn settled_context(context: &RecruitContext) -> RecruitContext {
    let mut ctx = context.clone();
    ctx.suppress_next_notification = false;
    ctx
}

fn advance(target: RecruitState, context: &RecruitContext) -> TransitionResult {
    TransitionResult::enter(target, settled_context(context))
}
