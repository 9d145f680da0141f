//! SQLite-backed artifact store for session backups

mod schema;

use schema::SCHEMA;

use crate::backup::{Artifact, ArtifactId, BackupStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct SqliteBackupStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackupStore {
    /// Open or create database at the given path
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or the schema cannot be applied.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Fails if the schema cannot be applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_artifact(&self, payload: &str) -> StoreResult<ArtifactId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backup_artifacts (payload, created_at) VALUES (?1, ?2)",
            params![payload, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first; ids are monotonic so they order by write time
    pub fn recent_artifacts(&self, limit: usize) -> StoreResult<Vec<Artifact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, payload, created_at FROM backup_artifacts
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok(Artifact {
                id: row.get(0)?,
                payload: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn delete_artifact(&self, id: ArtifactId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM backup_artifacts WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[async_trait]
impl BackupStore for SqliteBackupStore {
    async fn write(&self, payload: &str) -> Result<ArtifactId, String> {
        self.insert_artifact(payload).map_err(|e| e.to_string())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Artifact>, String> {
        self.recent_artifacts(limit).map_err(|e| e.to_string())
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), String> {
        self.delete_artifact(id).map_err(|e| e.to_string())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
