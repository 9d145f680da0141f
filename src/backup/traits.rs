//! Durable, append-only store for backup artifacts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type ArtifactId = i64;

/// One stored item. The store does not interpret `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Append a new artifact
    async fn write(&self, payload: &str) -> Result<ArtifactId, String>;

    /// Up to `limit` most recent artifacts, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Artifact>, String>;

    async fn delete(&self, id: ArtifactId) -> Result<(), String>;
}

#[async_trait]
impl<T: BackupStore + ?Sized> BackupStore for Arc<T> {
    async fn write(&self, payload: &str) -> Result<ArtifactId, String> {
        (**self).write(payload).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Artifact>, String> {
        (**self).list_recent(limit).await
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), String> {
        (**self).delete(id).await
    }
}
