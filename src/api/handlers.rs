//! HTTP side-channel handlers: health, spin toggle, debug log feed.
//!
//! These are thin wrappers over the relay hub; all coordination state lives
//! behind it.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// GET /
pub async fn root() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub active_rooms: usize,
    pub active_clients: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        active_rooms: state.hub.room_count(),
        active_clients: state.hub.client_count(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub success: bool,
    pub room_id: String,
    pub action: &'static str,
    pub was_spinning: bool,
    pub command: Value,
    pub client_count: usize,
}

/// GET /toggle/{room_id}
///
/// Inverts the room's `isSpinning` flag and broadcasts the matching
/// start/stop command to every member.
pub async fn toggle_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<ToggleResponse>> {
    let toggle = state
        .hub
        .toggle_spin(&room_id)
        .ok_or_else(|| ApiError::not_found(format!("Room {room_id} not found")))?;

    Ok(Json(ToggleResponse {
        success: true,
        room_id,
        action: toggle.action,
        was_spinning: toggle.was_spinning,
        command: toggle.command,
        client_count: toggle.client_count,
    }))
}

/// GET /log/stream
///
/// Replays the retained log ring, then follows with live lines as SSE.
pub async fn log_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let recent = state.log.recent();
    let live = BroadcastStream::new(state.log.subscribe())
        .filter_map(|line| async move { line.ok() });

    let stream = futures::stream::iter(recent)
        .chain(live)
        .map(|line| Ok(Event::default().data(line)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Fallback for unknown paths.
pub async fn not_found() -> ApiError {
    ApiError::not_found("no such endpoint")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbuf::LogBuffer;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(Arc::new(LogBuffer::new()), Vec::new())
    }

    #[tokio::test]
    async fn test_health_counts_follow_hub() {
        let state = state();
        let (a, _rx) = state.hub.register();
        state.hub.join_room(&a, "R1", None);

        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.active_rooms, 1);
        assert_eq!(body.active_clients, 1);
    }

    #[tokio::test]
    async fn test_toggle_unknown_room_is_404() {
        let state = state();
        let result = toggle_room(State(state), Path("ghost".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_toggle_response_shape() {
        let state = state();
        let (a, _rx) = state.hub.register();
        state.hub.join_room(&a, "R1", None);

        let Json(body) = toggle_room(State(state), Path("R1".to_string()))
            .await
            .unwrap();
        assert!(body.success);
        assert_eq!(body.room_id, "R1");
        assert_eq!(body.action, "start");
        assert!(!body.was_spinning);
        assert_eq!(body.client_count, 1);
        assert_eq!(body.command["action"], json!("start"));
    }
}
