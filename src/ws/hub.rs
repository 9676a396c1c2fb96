//! Relay hub: connection registry, room operations, and broadcast fan-out.
//!
//! The hub tracks every live WebSocket connection and fronts the
//! [`RoomRegistry`]. Outbound delivery goes through a bounded per-connection
//! channel drained by that connection's socket task, so no registry lock is
//! ever held across network I/O: fan-out snapshots membership under the room
//! lock, releases it, then hands each envelope off with `try_send`. A channel
//! that cannot accept immediately counts as a failed delivery for that
//! recipient and never stalls the rest.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use nanoid::nanoid;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::logbuf::LogBuffer;
use crate::rooms::{GameState, LeaveOutcome, RoomRegistry};

use super::types::{ServerMessage, now_millis};

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// Length of generated connection ids.
const CLIENT_ID_LEN: usize = 8;

/// Sender tag used for commands originating from the HTTP side-channel.
const HTTP_CLIENT_ID: &str = "http-api";

struct ConnectionHandle {
    tx: mpsc::Sender<ServerMessage>,
    room_id: Option<String>,
    client_type: Option<String>,
    last_seen_ms: i64,
}

/// Result of an HTTP spin toggle, for the response body.
pub struct SpinToggle {
    pub action: &'static str,
    pub was_spinning: bool,
    pub client_count: usize,
    pub command: Value,
}

/// Shared relay state: all connections and all rooms.
pub struct RelayHub {
    connections: DashMap<String, ConnectionHandle>,
    rooms: RoomRegistry,
    log: Arc<LogBuffer>,
}

impl RelayHub {
    pub fn new(log: Arc<LogBuffer>) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: RoomRegistry::new(),
            log,
        }
    }

    /// Register a new connection and allocate its id.
    ///
    /// Returns the id and the receiver the socket task drains.
    pub fn register(&self) -> (String, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let client_id = nanoid!(CLIENT_ID_LEN);
        self.connections.insert(
            client_id.clone(),
            ConnectionHandle {
                tx,
                room_id: None,
                client_type: None,
                last_seen_ms: now_millis(),
            },
        );
        info!("New WebSocket connection: {client_id}");
        self.log
            .append(format!("New WebSocket connection: {client_id}"));
        (client_id, rx)
    }

    /// Remove a connection, leaving its room first so no membership goes
    /// stale. Idempotent; unknown ids are a no-op.
    pub fn unregister(&self, client_id: &str) {
        let Some((_, handle)) = self.connections.remove(client_id) else {
            return;
        };
        if let Some(room_id) = handle.room_id {
            self.leave_room(client_id, &room_id);
        }
        info!("Client disconnected: {client_id}");
        self.log.append(format!("Client disconnected: {client_id}"));
    }

    /// Stamp a connection's heartbeat; no-op if unknown.
    ///
    /// Advisory only: missed heartbeats never evict a connection. The only
    /// eviction paths are transport close and the idle-room reaper.
    pub fn touch_liveness(&self, client_id: &str) {
        if let Some(mut handle) = self.connections.get_mut(client_id) {
            handle.last_seen_ms = now_millis();
        }
    }

    /// Deliver one envelope to one connection; failure is logged and dropped.
    pub fn send_to(&self, client_id: &str, msg: ServerMessage) {
        let Some(handle) = self.connections.get(client_id) else {
            debug!("send_to: client {client_id} not registered");
            return;
        };
        if let Err(err) = handle.tx.try_send(msg) {
            warn!("Failed to queue message for client {client_id}: {err}");
        }
    }

    /// Join a room, leaving the current one first.
    ///
    /// Pushes the room's merged state privately to the joiner, then notifies
    /// the rest of the room.
    pub fn join_room(&self, client_id: &str, room_id: &str, client_type: Option<String>) {
        let Some(previous) = self
            .connections
            .get(client_id)
            .map(|handle| handle.room_id.clone())
        else {
            return;
        };
        if let Some(prev_room) = previous {
            self.leave_room(client_id, &prev_room);
        }

        let now = now_millis();
        let (state, _created) = self.rooms.join(room_id, client_id, now);

        match self.connections.get_mut(client_id) {
            Some(mut handle) => {
                handle.room_id = Some(room_id.to_string());
                handle.client_type = client_type.clone();
            }
            None => {
                // Connection closed while we were joining; undo membership.
                self.rooms.leave(room_id, client_id, now);
                return;
            }
        }

        let kind = client_type.as_deref().unwrap_or("unknown");
        info!("Client {client_id} joined room {room_id} as {kind}");
        self.log
            .append(format!("Client {client_id} joined room {room_id} as {kind}"));

        self.send_to(
            client_id,
            ServerMessage::GameState {
                data: state,
                timestamp: now,
            },
        );
        self.broadcast_to_room(
            room_id,
            ServerMessage::ClientJoined {
                client_id: client_id.to_string(),
                client_type,
                timestamp: now,
            },
            Some(client_id),
        );
    }

    /// Merge a state patch and replay the full state to the rest of the room.
    ///
    /// Fire-and-forget: a missing or unknown room is logged and dropped, and
    /// never creates a room — only a join does.
    pub fn update_state(&self, client_id: &str, room_id: Option<&str>, patch: GameState) {
        let Some(room_id) = room_id else {
            self.log.append(format!(
                "[ERROR] gameState without roomId from client {client_id}"
            ));
            warn!("gameState without roomId from client {client_id}");
            return;
        };
        let now = now_millis();
        let Some(merged) = self.rooms.merge_state(room_id, patch, now) else {
            self.log.append(format!(
                "[ERROR] Room {room_id} not found for gameState from client {client_id}"
            ));
            warn!("Room {room_id} not found for gameState from client {client_id}");
            return;
        };
        self.broadcast_to_room(
            room_id,
            ServerMessage::GameState {
                data: merged,
                timestamp: now,
            },
            Some(client_id),
        );
    }

    /// Relay an opaque command to the rest of the room, tagged with the
    /// sender. Same silent-drop rules as state updates.
    pub fn relay_command(&self, client_id: &str, room_id: Option<&str>, data: Value) {
        let Some(room_id) = room_id else {
            self.log.append(format!(
                "[ERROR] command without roomId from client {client_id}"
            ));
            warn!("command without roomId from client {client_id}");
            return;
        };
        let now = now_millis();
        if !self.rooms.touch_activity(room_id, now) {
            self.log.append(format!(
                "[ERROR] Room {room_id} not found for command from client {client_id}"
            ));
            warn!("Room {room_id} not found for command from client {client_id}");
            return;
        }
        self.broadcast_to_room(
            room_id,
            ServerMessage::Command {
                data,
                from_client: client_id.to_string(),
                timestamp: now,
            },
            Some(client_id),
        );
    }

    /// Deliver an envelope to every room member except `exclude`.
    ///
    /// Members missing from the connection registry, or whose channel cannot
    /// accept immediately, are skipped without being removed from the room —
    /// membership cleanup happens only through an explicit leave. Best-effort,
    /// at-most-once per recipient, no ordering across recipients.
    pub fn broadcast_to_room(&self, room_id: &str, msg: ServerMessage, exclude: Option<&str>) {
        let Some(members) = self.rooms.members(room_id) else {
            debug!("broadcast: room {room_id} not found");
            return;
        };

        let wire = match serde_json::to_string(&msg) {
            Ok(wire) => wire,
            Err(err) => {
                warn!("Failed to serialize {} envelope: {err}", msg.kind());
                return;
            }
        };

        let mut sent = 0usize;
        for member in &members {
            if Some(member.as_str()) == exclude {
                continue;
            }
            let Some(handle) = self.connections.get(member) else {
                debug!("broadcast: client {member} not in connection registry");
                continue;
            };
            match handle.tx.try_send(msg.clone()) {
                Ok(()) => {
                    sent += 1;
                    self.log
                        .append(format!("[OUT] [room:{room_id}] to client:{member} -> {wire}"));
                }
                Err(err) => {
                    warn!("broadcast: dropping delivery to client {member}: {err}");
                }
            }
        }

        if sent > 0 {
            debug!(
                "Broadcasted {} to {sent} client(s) in room {room_id}",
                msg.kind()
            );
        }
    }

    /// HTTP side-channel: invert `isSpinning` and broadcast the matching
    /// start/stop command to the whole room. `None` if the room is unknown.
    pub fn toggle_spin(&self, room_id: &str) -> Option<SpinToggle> {
        let now = now_millis();
        let outcome = self.rooms.toggle_spin(room_id, now)?;
        let action = if outcome.was_spinning { "stop" } else { "start" };
        let command = json!({"action": action, "timestamp": now});

        info!(
            "HTTP {action} command for room {room_id} (was spinning: {})",
            outcome.was_spinning
        );
        self.broadcast_to_room(
            room_id,
            ServerMessage::Command {
                data: command.clone(),
                from_client: HTTP_CLIENT_ID.to_string(),
                timestamp: now,
            },
            None,
        );

        Some(SpinToggle {
            action,
            was_spinning: outcome.was_spinning,
            client_count: outcome.member_count,
            command,
        })
    }

    /// Evict rooms idle past the threshold; returns the evicted ids.
    pub fn sweep_idle_rooms(&self, threshold_ms: i64) -> Vec<String> {
        let evicted = self.rooms.sweep_idle(threshold_ms, now_millis());
        for room_id in &evicted {
            info!("Cleaning up inactive room: {room_id}");
            self.log
                .append(format!("Cleaning up inactive room: {room_id}"));
        }
        evicted
    }

    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Append a protocol line to the shared log ring.
    pub fn log_line(&self, line: impl Into<String>) {
        self.log.append(line);
    }

    fn leave_room(&self, client_id: &str, room_id: &str) {
        let now = now_millis();
        match self.rooms.leave(room_id, client_id, now) {
            LeaveOutcome::NotFound => return,
            LeaveOutcome::RoomRemoved => {}
            LeaveOutcome::Remaining(_) => {
                self.broadcast_to_room(
                    room_id,
                    ServerMessage::ClientLeft {
                        client_id: client_id.to_string(),
                        timestamp: now,
                    },
                    None,
                );
            }
        }
        info!("Client {client_id} left room {room_id}");
        self.log
            .append(format!("Client {client_id} left room {room_id}"));
    }

    #[cfg(test)]
    fn room_of(&self, client_id: &str) -> Option<String> {
        self.connections
            .get(client_id)
            .and_then(|handle| handle.room_id.clone())
    }
}
