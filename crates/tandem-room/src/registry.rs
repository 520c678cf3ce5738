//! Room registry: creates, tracks, and collects rooms.
//!
//! The registry only maps codes to actor handles. Everything about a room's
//! members and state lives in its actor.

use std::collections::HashMap;

use tandem_protocol::{RoomId, RoomKind};
use tokio::sync::Mutex;

use crate::RoomHandle;
use crate::room::spawn_room;

/// Default command channel size for room actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// All live rooms, keyed by code.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    channel_size: usize,
}

impl RoomRegistry {
    /// Creates an empty registry whose actors queue up to `channel_size`
    /// commands.
    pub fn new(channel_size: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            channel_size,
        }
    }

    /// Spawns a room of the given kind under a fresh code.
    ///
    /// Codes are regenerated until one is not in use. The registry lock is
    /// held across the check and the insert.
    pub async fn create_room(&self, kind: RoomKind) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        let room_id = loop {
            let candidate = RoomId::generate();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
            tracing::debug!(room_id = %candidate, "room code collision, retrying");
        };
        let handle = spawn_room(room_id.clone(), kind, self.channel_size);
        rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(%room_id, %kind, "room created");
        handle
    }

    pub async fn lookup(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Drops the room if it has no members. Returns whether it was
    /// collected.
    ///
    /// The emptiness check runs inside the actor, so a join racing with
    /// collection either lands first (and the room survives) or finds the
    /// actor gone.
    pub async fn collect_if_empty(&self, room_id: &RoomId) -> bool {
        let Some(handle) = self.lookup(room_id).await else {
            return false;
        };
        // A stopped actor counts as empty.
        let closed = handle.close_if_empty().await.unwrap_or(true);
        if closed {
            self.rooms.lock().await.remove(room_id);
            tracing::info!(%room_id, "room collected");
        }
        closed
    }

    /// Shuts down every room and empties the registry.
    pub async fn shutdown_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.lock().await.drain().map(|(_, h)| h).collect();
        let count = handles.len();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
        tracing::info!(rooms = count, "all rooms shut down");
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_room_registers_unique_codes() {
        let registry = RoomRegistry::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let handle = registry.create_room(RoomKind::Duo).await;
            assert!(seen.insert(handle.room_id().clone()), "duplicate code");
        }
        assert_eq!(registry.len().await, 50);
    }

    #[tokio::test]
    async fn test_create_room_starts_awaiting_players() {
        let registry = RoomRegistry::default();
        let handle = registry.create_room(RoomKind::Squad).await;

        let info = handle.info().await.unwrap();
        assert_eq!(info.kind, RoomKind::Squad);
        assert_eq!(info.state, crate::RoomState::AwaitingPlayers);
        assert_eq!(info.roster.required, 4);
        assert!(info.roster.members.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_normalized_code() {
        let registry = RoomRegistry::default();
        let handle = registry.create_room(RoomKind::Duo).await;
        let typed = format!("  {}  ", handle.room_id().as_str().to_lowercase());

        assert!(registry.lookup(&RoomId::parse(&typed)).await.is_some());
    }

    #[tokio::test]
    async fn test_lookup_unknown_returns_none() {
        let registry = RoomRegistry::default();
        assert!(registry.lookup(&RoomId::parse("NOPE22")).await.is_none());
    }

    #[tokio::test]
    async fn test_collect_if_empty_removes_empty_room() {
        let registry = RoomRegistry::default();
        let handle = registry.create_room(RoomKind::Duo).await;
        let room_id = handle.room_id().clone();

        assert!(registry.collect_if_empty(&room_id).await);
        assert!(registry.lookup(&room_id).await.is_none());
        assert!(handle.info().await.is_err(), "actor should have stopped");
    }

    #[tokio::test]
    async fn test_collect_unknown_room_is_false() {
        let registry = RoomRegistry::default();
        assert!(!registry.collect_if_empty(&RoomId::parse("NOPE22")).await);
    }

    #[tokio::test]
    async fn test_shutdown_all_empties_registry() {
        let registry = RoomRegistry::default();
        let a = registry.create_room(RoomKind::Duo).await;
        registry.create_room(RoomKind::Solo).await;

        registry.shutdown_all().await;

        assert!(registry.is_empty().await);
        // The actor processes Shutdown before any later command.
        assert!(a.info().await.is_err());
    }
}
