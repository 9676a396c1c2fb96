//! Per-connection WebSocket handling: upgrade, message dispatch, liveness.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{
    State, WebSocketUpgrade,
    ws::{Message, WebSocket},
};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};

use crate::api::AppState;

use super::hub::RelayHub;
use super::types::{ClientMessage, ServerMessage, now_millis};

/// Interval for protocol-level keepalive pings.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

/// Drive one connection from accept to close.
///
/// Transport close is the only cancellation signal: it synchronously leaves
/// the room (if any) and unregisters the connection, so no room ever retains
/// a stale member.
async fn handle_connection(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut event_rx) = hub.register();

    hub.send_to(
        &client_id,
        ServerMessage::Connected {
            client_id: client_id.clone(),
            timestamp: now_millis(),
        },
    );

    // Drain the outbound channel, interleaved with keepalive pings. The task
    // ends itself when the transport stops accepting writes.
    let send_client_id = client_id.clone();
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!("Failed to serialize envelope for client {send_client_id}: {err}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                hub.log_line(format!("[IN] from client:{client_id} -> {text}"));
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => dispatch(&hub, &client_id, msg),
                    Err(err) => {
                        // Malformed frames are dropped; the connection is not
                        // penalized for sending one.
                        warn!("Failed to parse message from client {client_id}: {err}");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from client {client_id}");
            }
            Ok(Message::Ping(_)) => {
                // axum replies with a pong automatically.
                debug!("Protocol ping from client {client_id}");
            }
            Ok(Message::Pong(_)) => {
                hub.touch_liveness(&client_id);
            }
            Ok(Message::Close(_)) => {
                info!("Client {client_id} closed WebSocket connection");
                break;
            }
            Err(err) => {
                warn!("WebSocket error for client {client_id}: {err}");
                break;
            }
        }
    }

    send_task.abort();
    hub.unregister(&client_id);
}

/// Route one decoded envelope to the matching room operation.
fn dispatch(hub: &RelayHub, client_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::Join {
            room_id,
            client_type,
        }
        | ClientMessage::Handshake {
            room_id,
            client_type,
        } => {
            hub.join_room(client_id, &room_id, client_type);
        }
        ClientMessage::GameState { room_id, data } => {
            hub.update_state(client_id, room_id.as_deref(), data);
        }
        ClientMessage::Command { room_id, data } => {
            hub.relay_command(client_id, room_id.as_deref(), data);
        }
        ClientMessage::Ping => {
            hub.send_to(
                client_id,
                ServerMessage::Pong {
                    timestamp: now_millis(),
                },
            );
        }
        ClientMessage::Unknown => {
            debug!("Ignoring unknown envelope type from client {client_id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbuf::LogBuffer;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_ping_replies_pong_to_sender_only() {
        let hub = RelayHub::new(Arc::new(LogBuffer::new()));
        let (a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        dispatch(&hub, &a, ClientMessage::Ping);

        assert!(matches!(
            rx_a.try_recv().unwrap(),
            ServerMessage::Pong { .. }
        ));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_join_scenario() {
        let hub = RelayHub::new(Arc::new(LogBuffer::new()));
        let (a, mut rx_a) = hub.register();

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","roomId":"R1","clientType":"host"}"#).unwrap();
        dispatch(&hub, &a, msg);

        match rx_a.try_recv().unwrap() {
            ServerMessage::GameState { data, .. } => {
                assert_eq!(data["isSpinning"], json!(false));
                assert_eq!(data["numSlices"], json!(12));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_unknown_is_silent() {
        let hub = RelayHub::new(Arc::new(LogBuffer::new()));
        let (a, mut rx_a) = hub.register();
        dispatch(&hub, &a, ClientMessage::Unknown);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(hub.room_count(), 0);
    }
}
