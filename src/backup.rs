//! Durable backup and restore of recruitment sessions
//!
//! Backups are point-in-time: a crash loses at most the transitions made
//! since the last successful backup, and restored sessions resume from the
//! backed-up state. Restore never replays events.

pub mod scheduler;
pub mod snapshot;
pub mod traits;

pub use scheduler::BackupScheduler;
pub use snapshot::{BackupRecord, Snapshot, SnapshotError};
pub use traits::{Artifact, ArtifactId, BackupStore};

use crate::runtime::{ConversationTransport, RegistryError, SessionRegistry};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// How far back the cleanup pass looks for superseded backups
const CLEANUP_SCAN_LIMIT: usize = 100;

/// Default number of recent artifacts scanned during restore
pub const DEFAULT_RESTORE_LOOKBACK: usize = 10;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup store error: {0}")]
    Store(String),
    #[error("Failed to serialize backup record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of one backup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// No active sessions, nothing written
    Skipped,
    Written {
        artifact_id: ArtifactId,
        sessions: usize,
        pruned: usize,
    },
}

/// Result of a restore pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Artifact the sessions came from; `None` on a cold start
    pub artifact_id: Option<ArtifactId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub restored: usize,
    pub skipped_unresolved: usize,
    pub skipped_invalid: usize,
}

/// Write every active session into one artifact, then drop older backups
///
/// # Errors
///
/// Fails if the record cannot be serialized or the store rejects the write.
pub async fn backup<S: BackupStore + ?Sized>(
    registry: &SessionRegistry,
    store: &S,
) -> Result<BackupOutcome, BackupError> {
    let sessions = registry.active_snapshots();
    if sessions.is_empty() {
        tracing::info!("No active sessions to back up");
        return Ok(BackupOutcome::Skipped);
    }

    let record = BackupRecord::new(sessions);
    let payload = record.to_json()?;
    let artifact_id = store.write(&payload).await.map_err(BackupError::Store)?;
    let pruned = prune_older_backups(store, artifact_id).await;

    tracing::info!(
        artifact_id,
        sessions = record.sessions.len(),
        pruned,
        "Backed up recruit sessions"
    );
    Ok(BackupOutcome::Written {
        artifact_id,
        sessions: record.sessions.len(),
        pruned,
    })
}

/// Delete every backup artifact except `keep`. Foreign artifacts are left alone.
async fn prune_older_backups<S: BackupStore + ?Sized>(store: &S, keep: ArtifactId) -> usize {
    let artifacts = match store.list_recent(CLEANUP_SCAN_LIMIT).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "Could not list artifacts for cleanup");
            return 0;
        }
    };

    let mut pruned = 0;
    for artifact in artifacts {
        if artifact.id == keep || BackupRecord::parse(&artifact.payload).is_err() {
            continue;
        }
        match store.delete(artifact.id).await {
            Ok(()) => pruned += 1,
            Err(e) => {
                tracing::warn!(
                    artifact_id = artifact.id,
                    error = %e,
                    "Failed to delete old backup"
                );
            }
        }
    }
    pruned
}

/// Rebuild sessions from the newest parseable backup within `lookback` artifacts
///
/// # Errors
///
/// Only a failure to list artifacts is an error. Unusable artifacts and
/// sessions are skipped and counted in the report.
pub async fn restore<S, T>(
    registry: &SessionRegistry,
    store: &S,
    transport: &T,
    lookback: usize,
) -> Result<RestoreReport, BackupError>
where
    S: BackupStore + ?Sized,
    T: ConversationTransport + ?Sized,
{
    let artifacts = store.list_recent(lookback).await.map_err(BackupError::Store)?;

    let found = artifacts.into_iter().find_map(|artifact| {
        match BackupRecord::parse(&artifact.payload) {
            Ok(record) => Some((artifact.id, record)),
            Err(e) => {
                tracing::warn!(
                    artifact_id = artifact.id,
                    error = %e,
                    "Skipping artifact that is not a backup record"
                );
                None
            }
        }
    });

    let Some((artifact_id, record)) = found else {
        tracing::info!("No backup found, starting without sessions");
        return Ok(RestoreReport::default());
    };

    tracing::info!(
        artifact_id,
        timestamp = %record.timestamp,
        sessions = record.sessions.len(),
        "Found backup"
    );

    let mut report = RestoreReport {
        artifact_id: Some(artifact_id),
        timestamp: Some(record.timestamp),
        ..RestoreReport::default()
    };

    for (conversation_id, snapshot) in record.sessions {
        let handle = match transport.resolve_conversation(&conversation_id).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                tracing::warn!(
                    conv_id = %conversation_id,
                    "Conversation no longer exists, skipping"
                );
                report.skipped_unresolved += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(
                    conv_id = %conversation_id,
                    error = %e,
                    "Failed to resolve conversation, skipping"
                );
                report.skipped_unresolved += 1;
                continue;
            }
        };

        match registry.restore(&conversation_id, snapshot, handle.name) {
            Ok(_) => report.restored += 1,
            Err(e @ (RegistryError::InvalidSnapshot(_) | RegistryError::SessionExists(_))) => {
                tracing::warn!(
                    conv_id = %conversation_id,
                    error = %e,
                    "Cannot restore session, skipping"
                );
                report.skipped_invalid += 1;
            }
            Err(e) => {
                tracing::error!(
                    conv_id = %conversation_id,
                    error = %e,
                    "Unexpected error restoring session"
                );
                report.skipped_invalid += 1;
            }
        }
    }

    tracing::info!(
        restored = report.restored,
        skipped_unresolved = report.skipped_unresolved,
        skipped_invalid = report.skipped_invalid,
        "State restoration completed"
    );
    Ok(report)
}
