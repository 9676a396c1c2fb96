//! Room registry: membership, shared game state, and idle eviction.
//!
//! Rooms are pure metadata containers. A room appears when the first client
//! joins an unknown id, and disappears when its member set empties or when the
//! reaper sweeps it past the idle threshold. The shared state is a flat JSON
//! object merged shallowly, field by field; `lastUpdate` is stamped on every
//! merge.
//!
//! All methods take an explicit `now_ms` where they stamp time, and return
//! owned snapshots so callers never hold the registry lock while sending.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use serde_json::{Map, Value, json};

/// Default slice count for a freshly created wheel.
const DEFAULT_NUM_SLICES: u64 = 12;

/// Flat JSON object holding a room's merged game state.
pub type GameState = Map<String, Value>;

/// Initial state for a room created by a first join.
pub fn default_game_state(now_ms: i64) -> GameState {
    let mut state = Map::new();
    state.insert("isSpinning".to_string(), json!(false));
    state.insert("isDecelerating".to_string(), json!(false));
    state.insert("winner".to_string(), Value::Null);
    state.insert("categories".to_string(), json!([]));
    state.insert("numSlices".to_string(), json!(DEFAULT_NUM_SLICES));
    state.insert("lastUpdate".to_string(), json!(now_ms));
    state
}

struct Room {
    members: HashSet<String>,
    state: GameState,
    last_activity_ms: i64,
}

impl Room {
    fn new(now_ms: i64) -> Self {
        Self {
            members: HashSet::new(),
            state: default_game_state(now_ms),
            last_activity_ms: now_ms,
        }
    }
}

/// Result of removing a member from a room.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Room or membership did not exist; nothing changed.
    NotFound,
    /// The leaving member was the last one; the room is gone.
    RoomRemoved,
    /// Members remain; snapshot of who is left.
    Remaining(Vec<String>),
}

/// Result of a spin toggle.
pub struct ToggleOutcome {
    pub was_spinning: bool,
    pub member_count: usize,
}

/// Registry of all active rooms.
///
/// A single mutex domain: join, leave, merge, and sweep are cross-key
/// transactions and must not interleave.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a member, creating the room with default state if needed.
    ///
    /// Returns the room's current state for delivery to the joiner, and
    /// whether the room was created by this call.
    pub fn join(&self, room_id: &str, client_id: &str, now_ms: i64) -> (GameState, bool) {
        let mut rooms = self.lock();
        let created = !rooms.contains_key(room_id);
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(now_ms));
        room.members.insert(client_id.to_string());
        room.last_activity_ms = now_ms;
        if created {
            info!("Created new room: {room_id}");
        }
        (room.state.clone(), created)
    }

    /// Remove a member; deletes the room when the member set empties.
    pub fn leave(&self, room_id: &str, client_id: &str, now_ms: i64) -> LeaveOutcome {
        let mut rooms = self.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return LeaveOutcome::NotFound;
        };
        if !room.members.remove(client_id) {
            return LeaveOutcome::NotFound;
        }
        if room.members.is_empty() {
            rooms.remove(room_id);
            info!("Removed empty room: {room_id}");
            LeaveOutcome::RoomRemoved
        } else {
            room.last_activity_ms = now_ms;
            LeaveOutcome::Remaining(room.members.iter().cloned().collect())
        }
    }

    /// Shallow-merge a patch into the room state.
    ///
    /// Fields present in the patch overwrite; everything else is preserved.
    /// `lastUpdate` is stamped unconditionally. Returns the merged state, or
    /// `None` when the room does not exist — a state update never creates a
    /// room, only a join does.
    pub fn merge_state(&self, room_id: &str, patch: GameState, now_ms: i64) -> Option<GameState> {
        let mut rooms = self.lock();
        let room = rooms.get_mut(room_id)?;
        let fields: Vec<String> = patch.keys().cloned().collect();
        debug!("Game state updated in room {room_id}: {fields:?}");
        for (key, value) in patch {
            room.state.insert(key, value);
        }
        room.state.insert("lastUpdate".to_string(), json!(now_ms));
        room.last_activity_ms = now_ms;
        Some(room.state.clone())
    }

    /// Mark the room alive without touching its state.
    pub fn touch_activity(&self, room_id: &str, now_ms: i64) -> bool {
        let mut rooms = self.lock();
        match rooms.get_mut(room_id) {
            Some(room) => {
                room.last_activity_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Members of a room, if it exists.
    pub fn members(&self, room_id: &str) -> Option<Vec<String>> {
        self.lock()
            .get(room_id)
            .map(|room| room.members.iter().cloned().collect())
    }

    /// Atomically read and invert `isSpinning`, stamping `lastUpdate`.
    pub fn toggle_spin(&self, room_id: &str, now_ms: i64) -> Option<ToggleOutcome> {
        let mut rooms = self.lock();
        let room = rooms.get_mut(room_id)?;
        let was_spinning = room
            .state
            .get("isSpinning")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        room.state
            .insert("isSpinning".to_string(), json!(!was_spinning));
        room.state.insert("lastUpdate".to_string(), json!(now_ms));
        room.last_activity_ms = now_ms;
        Some(ToggleOutcome {
            was_spinning,
            member_count: room.members.len(),
        })
    }

    /// Evict every room idle for longer than `threshold_ms`, regardless of
    /// membership. Returns the evicted room ids.
    pub fn sweep_idle(&self, threshold_ms: i64, now_ms: i64) -> Vec<String> {
        let mut rooms = self.lock();
        let stale: Vec<String> = rooms
            .iter()
            .filter(|(_, room)| now_ms - room.last_activity_ms > threshold_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            rooms.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_default_state_shape() {
        let state = default_game_state(T0);
        assert_eq!(state["isSpinning"], json!(false));
        assert_eq!(state["isDecelerating"], json!(false));
        assert_eq!(state["winner"], Value::Null);
        assert_eq!(state["categories"], json!([]));
        assert_eq!(state["numSlices"], json!(12));
        assert_eq!(state["lastUpdate"], json!(T0));
    }

    #[test]
    fn test_join_creates_room_once() {
        let registry = RoomRegistry::new();
        let (_, created) = registry.join("R1", "a", T0);
        assert!(created);
        let (_, created) = registry.join("R1", "b", T0 + 1);
        assert!(!created);
        assert_eq!(registry.len(), 1);
        let mut members = registry.members("R1").unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[test]
    fn test_merge_preserves_unrelated_fields() {
        let registry = RoomRegistry::new();
        registry.join("R1", "a", T0);

        let mut patch = GameState::new();
        patch.insert("isSpinning".to_string(), json!(true));
        registry.merge_state("R1", patch, T0 + 10).unwrap();

        let mut patch = GameState::new();
        patch.insert("winner".to_string(), json!("X"));
        let merged = registry.merge_state("R1", patch, T0 + 20).unwrap();

        assert_eq!(merged["isSpinning"], json!(true));
        assert_eq!(merged["winner"], json!("X"));
        assert_eq!(merged["numSlices"], json!(12));
        assert_eq!(merged["lastUpdate"], json!(T0 + 20));
    }

    #[test]
    fn test_merge_unknown_room_is_none() {
        let registry = RoomRegistry::new();
        assert!(registry.merge_state("nope", GameState::new(), T0).is_none());
        // No implicit creation.
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_room_resets_to_default_state() {
        let registry = RoomRegistry::new();
        registry.join("R1", "a", T0);
        let mut patch = GameState::new();
        patch.insert("winner".to_string(), json!("X"));
        registry.merge_state("R1", patch, T0).unwrap();

        assert_eq!(registry.leave("R1", "a", T0), LeaveOutcome::RoomRemoved);
        assert!(registry.is_empty());

        let (state, created) = registry.join("R1", "b", T0 + 100);
        assert!(created);
        assert_eq!(state["winner"], Value::Null);
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.leave("R1", "a", T0), LeaveOutcome::NotFound);
        registry.join("R1", "a", T0);
        assert_eq!(registry.leave("R1", "ghost", T0), LeaveOutcome::NotFound);
        assert_eq!(registry.members("R1").unwrap().len(), 1);
    }

    #[test]
    fn test_leave_reports_remaining_members() {
        let registry = RoomRegistry::new();
        registry.join("R1", "a", T0);
        registry.join("R1", "b", T0);
        match registry.leave("R1", "a", T0 + 5) {
            LeaveOutcome::Remaining(members) => assert_eq!(members, vec!["b"]),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_sweep_evicts_populated_rooms() {
        let registry = RoomRegistry::new();
        registry.join("old", "a", T0);
        registry.join("fresh", "b", T0 + 400_000);

        let evicted = registry.sweep_idle(300_000, T0 + 400_001);
        assert_eq!(evicted, vec!["old"]);
        assert!(registry.members("old").is_none());
        assert!(registry.members("fresh").is_some());
    }

    #[test]
    fn test_touch_activity_defers_sweep() {
        let registry = RoomRegistry::new();
        registry.join("R1", "a", T0);
        assert!(registry.touch_activity("R1", T0 + 250_000));
        assert!(registry.sweep_idle(300_000, T0 + 400_000).is_empty());
        assert!(!registry.touch_activity("ghost", T0));
    }

    #[test]
    fn test_toggle_spin_inverts_state() {
        let registry = RoomRegistry::new();
        registry.join("R1", "a", T0);

        let outcome = registry.toggle_spin("R1", T0 + 1).unwrap();
        assert!(!outcome.was_spinning);
        assert_eq!(outcome.member_count, 1);

        let outcome = registry.toggle_spin("R1", T0 + 2).unwrap();
        assert!(outcome.was_spinning);

        assert!(registry.toggle_spin("ghost", T0).is_none());
    }
}
