//! HTTP API for the recruit engine
//!
//! Lets the chat platform start sessions, forward user events, inspect
//! live sessions and trigger an immediate backup.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::backup::BackupStore;
use crate::runtime::SessionRegistry;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn BackupStore>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn BackupStore>) -> Self {
        Self { registry, store }
    }
}
