//! API request and response types

use crate::backup::{ArtifactId, BackupOutcome};
use crate::runtime::{DispatchOutcome, SessionInfo};
use crate::state_machine::Event;
use serde::{Deserialize, Serialize};

/// Event forwarded from the chat platform
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub event: Event,
    /// Request-scoped id for log correlation; never stored in the session
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Response with a single session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionInfo,
}

/// Response with every live session
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Response for a forwarded event
#[derive(Debug, Serialize)]
pub struct EventResponse {
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    /// Absent once the session has finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}

/// Response for a manual backup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
    pub sessions: usize,
    pub pruned: usize,
}

impl From<BackupOutcome> for BackupResponse {
    fn from(outcome: BackupOutcome) -> Self {
        match outcome {
            BackupOutcome::Skipped => Self {
                written: false,
                artifact_id: None,
                sessions: 0,
                pruned: 0,
            },
            BackupOutcome::Written {
                artifact_id,
                sessions,
                pruned,
            } => Self {
                written: true,
                artifact_id: Some(artifact_id),
                sessions,
                pruned,
            },
        }
    }
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
