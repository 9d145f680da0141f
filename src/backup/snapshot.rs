//! Snapshot and backup record schema
//!
//! The only persisted artifact shape:
//! `{ "timestamp": ISO-8601, "sessions": { <conversationId>: { "state", "context" } } }`

use crate::state_machine::{FlowDefinition, RecruitContext, RecruitState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Point-in-time projection of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: RecruitState,
    pub context: RecruitContext,
}

/// Reasons a snapshot cannot be turned back into a live session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot is in transient state {0}")]
    TransientState(RecruitState),
    #[error("snapshot is in terminal state {0}")]
    TerminalState(RecruitState),
    #[error("agreement count {count} exceeds maximum {max}")]
    AgreementsExceeded { count: u32, max: u32 },
}

impl Snapshot {
    pub fn new(state: RecruitState, context: RecruitContext) -> Self {
        Self { state, context }
    }

    /// Check that a live session may be rebuilt from this snapshot
    pub fn validate(&self, flow: &FlowDefinition) -> Result<(), SnapshotError> {
        if self.state.is_transient() {
            return Err(SnapshotError::TransientState(self.state));
        }
        if self.state.is_terminal() {
            return Err(SnapshotError::TerminalState(self.state));
        }
        validate_context(&self.context, flow)
    }
}

/// Context bounds that hold in every state
///
/// # Errors
///
/// Returns the first bound the context violates.
pub fn validate_context(
    context: &RecruitContext,
    flow: &FlowDefinition,
) -> Result<(), SnapshotError> {
    if context.agreement_count > flow.max_agreements() {
        return Err(SnapshotError::AgreementsExceeded {
            count: context.agreement_count,
            max: flow.max_agreements(),
        });
    }
    Ok(())
}

/// Aggregate of every active session at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: DateTime<Utc>,
    pub sessions: BTreeMap<String, Snapshot>,
}

impl BackupRecord {
    pub fn new(sessions: BTreeMap<String, Snapshot>) -> Self {
        Self {
            timestamp: Utc::now(),
            sessions,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a stored payload, failing if it does not match the backup schema
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
