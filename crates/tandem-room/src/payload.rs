//! Per-session data held by a room while it is in game.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tandem_protocol::{ClientId, SessionBlob};

/// Created when a room enters `InGame`, dropped when it resets.
///
/// Holds one opaque blob per member. The room never looks inside.
#[derive(Debug, Clone)]
pub struct SessionPayload {
    blobs: HashMap<ClientId, SessionBlob>,
    started: Instant,
}

impl SessionPayload {
    pub fn new() -> Self {
        Self {
            blobs: HashMap::new(),
            started: Instant::now(),
        }
    }

    /// Stores `blob` for `client`, replacing any earlier one.
    pub fn insert(&mut self, client: ClientId, blob: SessionBlob) -> Option<SessionBlob> {
        self.blobs.insert(client, blob)
    }

    pub fn get(&self, client: &ClientId) -> Option<&SessionBlob> {
        self.blobs.get(client)
    }

    /// Members that have published a blob, sorted.
    pub fn players(&self) -> Vec<ClientId> {
        let mut players: Vec<_> = self.blobs.keys().cloned().collect();
        players.sort();
        players
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SessionPayload {
    fn default() -> Self {
        Self::new()
    }
}
