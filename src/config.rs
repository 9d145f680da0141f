//! Runtime configuration from environment variables

use crate::backup::DEFAULT_RESTORE_LOOKBACK;
use crate::state_machine::FlowDefinition;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8070;
const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 30 * 60;
const DEFAULT_TOTAL_TERMS: u32 = 2;
const DEFAULT_EFFECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    pub backup_interval_secs: u64,
    /// Artifacts scanned for a usable backup at startup
    pub restore_lookback: usize,
    pub total_terms: u32,
    pub effect_timeout_secs: u64,
    /// Chat-platform service; `None` means log-only effects
    pub collaborator_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("RECRUIT_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.recruitd/backups.db"))
            },
            PathBuf::from,
        );

        Self {
            db_path,
            port: parsed(&lookup, "RECRUIT_PORT", DEFAULT_PORT),
            backup_interval_secs: parsed(
                &lookup,
                "RECRUIT_BACKUP_INTERVAL_SECS",
                DEFAULT_BACKUP_INTERVAL_SECS,
            )
            .max(1),
            restore_lookback: parsed(&lookup, "RECRUIT_RESTORE_LOOKBACK", DEFAULT_RESTORE_LOOKBACK)
                .max(1),
            total_terms: parsed(&lookup, "RECRUIT_TOTAL_TERMS", DEFAULT_TOTAL_TERMS),
            effect_timeout_secs: parsed(
                &lookup,
                "RECRUIT_EFFECT_TIMEOUT_SECS",
                DEFAULT_EFFECT_TIMEOUT_SECS,
            )
            .max(1),
            collaborator_url: lookup("RECRUIT_COLLABORATOR_URL")
                .filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn flow(&self) -> FlowDefinition {
        FlowDefinition::new(self.total_terms)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn effect_timeout(&self) -> Duration {
        Duration::from_secs(self.effect_timeout_secs)
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
            default
        }),
        None => default,
    }
}
