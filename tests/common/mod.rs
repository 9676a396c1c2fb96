//! Test utilities and common setup.

use std::sync::Arc;

use axum::Router;
use spinhub::api::{self, AppState};
use spinhub::logbuf::LogBuffer;

/// Create a test application with default (unrestricted) CORS.
pub fn test_app() -> Router {
    let (router, _state) = test_app_with_state();
    router
}

/// Create a test application, keeping the state handle so tests can drive
/// the hub directly.
pub fn test_app_with_state() -> (Router, AppState) {
    let log = Arc::new(LogBuffer::new());
    let state = AppState::new(log, Vec::new());
    (api::create_router(state.clone()), state)
}
