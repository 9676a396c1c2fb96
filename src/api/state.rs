//! Application state shared across handlers.

use std::sync::Arc;

use crate::logbuf::LogBuffer;
use crate::ws::RelayHub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay hub: connection and room registries plus fan-out.
    pub hub: Arc<RelayHub>,
    /// Shared log ring backing the SSE debug feed.
    pub log: Arc<LogBuffer>,
    /// Configured CORS origin allow-list; empty means unrestricted.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(log: Arc<LogBuffer>, allowed_origins: Vec<String>) -> Self {
        Self {
            hub: Arc::new(RelayHub::new(log.clone())),
            log,
            allowed_origins,
        }
    }
}
