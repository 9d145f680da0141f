//! Recruitment state and context types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Conversation Track
// ============================================================================

/// Which branch of the flow a conversation follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Identity, then straight to external-account verification
    Short,
    /// Prerequisites, referral route and term agreements before verification
    Long,
}

impl Track {
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Short => "short",
            Track::Long => "long",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Recruitment State
// ============================================================================

/// Recruitment conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecruitState {
    /// Session exists but has not been started
    #[default]
    Idle,

    /// Waiting for the user to pick a track
    SelectingTrack,

    /// Waiting for the user to submit their identity
    EnteringIdentity,

    /// Transient branch point, never observed by subscribers
    IdentityValidated,

    /// Long track: waiting for the user to acknowledge conditions
    CheckingPrerequisites,

    /// Long track: waiting for the user to pick a referral route
    SelectingReferralRoute,

    /// Long track: presenting terms one at a time
    AgreeingTerms,

    /// Waiting for the external account to be verified
    VerifyingExternalAccount,

    /// Handing the conversation to a human operator
    NotifyingOperator,

    /// Terminal state, no outgoing transitions
    Completed,
}

impl RecruitState {
    pub const ALL: [RecruitState; 10] = [
        RecruitState::Idle,
        RecruitState::SelectingTrack,
        RecruitState::EnteringIdentity,
        RecruitState::IdentityValidated,
        RecruitState::CheckingPrerequisites,
        RecruitState::SelectingReferralRoute,
        RecruitState::AgreeingTerms,
        RecruitState::VerifyingExternalAccount,
        RecruitState::NotifyingOperator,
        RecruitState::Completed,
    ];

    /// Wire name, as used in snapshots and `<state>_ERROR` events
    pub fn as_str(self) -> &'static str {
        match self {
            RecruitState::Idle => "idle",
            RecruitState::SelectingTrack => "selectingTrack",
            RecruitState::EnteringIdentity => "enteringIdentity",
            RecruitState::IdentityValidated => "identityValidated",
            RecruitState::CheckingPrerequisites => "checkingPrerequisites",
            RecruitState::SelectingReferralRoute => "selectingReferralRoute",
            RecruitState::AgreeingTerms => "agreeingTerms",
            RecruitState::VerifyingExternalAccount => "verifyingExternalAccount",
            RecruitState::NotifyingOperator => "notifyingOperator",
            RecruitState::Completed => "completed",
        }
    }

    /// Check if this is the terminal state (cannot transition out)
    pub fn is_terminal(self) -> bool {
        matches!(self, RecruitState::Completed)
    }

    /// Check if this is the "always" pseudo-state that branches immediately
    pub fn is_transient(self) -> bool {
        matches!(self, RecruitState::IdentityValidated)
    }
}

impl fmt::Display for RecruitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for RecruitState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecruitState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

// ============================================================================
// Recruitment Context
// ============================================================================

/// Mutable business data owned by a session.
///
/// Must stay fully serializable: it is persisted verbatim in snapshots.
/// Per-request correlation data travels with events, never in here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecruitContext {
    pub track: Option<Track>,
    pub principal_id: Option<String>,
    pub principal_name: Option<String>,
    pub referral_route: Option<String>,
    /// Term agreements granted so far; never decreases
    pub agreement_count: u32,
    /// Set by error-recovery edges so the fallback state is not re-rendered
    pub suppress_next_notification: bool,
}

/// Optional initial values applied on top of a fresh context at start
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextOverrides {
    pub track: Option<Track>,
    pub principal_id: Option<String>,
    pub principal_name: Option<String>,
    pub referral_route: Option<String>,
    pub agreement_count: Option<u32>,
}

impl ContextOverrides {
    pub fn apply(self, mut context: RecruitContext) -> RecruitContext {
        if self.track.is_some() {
            context.track = self.track;
        }
        if self.principal_id.is_some() {
            context.principal_id = self.principal_id;
        }
        if self.principal_name.is_some() {
            context.principal_name = self.principal_name;
        }
        if self.referral_route.is_some() {
            context.referral_route = self.referral_route;
        }
        if let Some(count) = self.agreement_count {
            context.agreement_count = count;
        }
        context
    }
}
