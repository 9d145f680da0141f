//! Periodic backup timer

use super::{backup, BackupOutcome, BackupStore};
use crate::runtime::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct BackupScheduler<S: BackupStore + ?Sized + 'static> {
    registry: Arc<SessionRegistry>,
    store: Arc<S>,
    interval: Duration,
}

impl<S: BackupStore + ?Sized + 'static> BackupScheduler<S> {
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<S>, interval: Duration) -> Self {
        Self {
            registry,
            store,
            interval,
        }
    }

    /// Back up every `interval` until cancelled. A failed attempt is logged
    /// and superseded by the next one.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "Backup scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.backup_once().await;
                }
            }
        }

        tracing::info!("Backup scheduler stopped");
    }

    /// One backup attempt; errors are logged, never propagated
    pub async fn backup_once(&self) -> Option<BackupOutcome> {
        match backup(&self.registry, self.store.as_ref()).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Backup failed, will retry on next tick");
                None
            }
        }
    }
}
