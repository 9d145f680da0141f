//! Recruit engine - orchestration of multi-step recruitment conversations
//!
//! Each conversation is driven by its own state machine. Sessions are
//! periodically backed up to a durable store and restored after a restart.

pub mod api;
pub mod backup;
pub mod collaborator;
pub mod config;
pub mod db;
pub mod runtime;
pub mod shutdown;
pub mod state_machine;
