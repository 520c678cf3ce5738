//! The authoritative room state.

use std::fmt;

/// Lifecycle state of a room.
///
/// ```text
/// AwaitingPlayers ──join, now full──→ AwaitingReady ──all ready──→ InGame
///        ↑                                  │                        │
///        ├──────────────── leave ───────────┘                  leave │
///        │                                                           ▼
///        └──────────────── last member leaves ─────────────────── Recovery
/// ```
///
/// There is no terminal state: `AwaitingPlayers` is the reset point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomState {
    /// Not enough members yet.
    AwaitingPlayers,
    /// Full; waiting for every member to declare readiness.
    AwaitingReady,
    /// Everyone was ready; the session payload exists.
    InGame,
    /// A member left mid-session. The payload is kept.
    Recovery,
}

impl RoomState {
    /// `true` while a session payload exists.
    pub fn in_session(self) -> bool {
        matches!(self, Self::InGame | Self::Recovery)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The state a room must be in given its counts.
///
/// Every committed transition lands on exactly this value, which is what
/// keeps the stored state from drifting away from membership.
pub fn derive(members: usize, ready: usize, required: usize, in_session: bool) -> RoomState {
    debug_assert!(ready <= members, "more ready members than members");
    match (in_session, members) {
        (_, 0) => RoomState::AwaitingPlayers,
        (true, m) if m >= required => RoomState::InGame,
        (true, _) => RoomState::Recovery,
        (false, m) if m >= required => RoomState::AwaitingReady,
        (false, _) => RoomState::AwaitingPlayers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_pre_session() {
        assert_eq!(derive(0, 0, 2, false), RoomState::AwaitingPlayers);
        assert_eq!(derive(1, 1, 2, false), RoomState::AwaitingPlayers);
        assert_eq!(derive(2, 1, 2, false), RoomState::AwaitingReady);
    }

    #[test]
    fn test_derive_in_session() {
        assert_eq!(derive(2, 2, 2, true), RoomState::InGame);
        assert_eq!(derive(1, 1, 2, true), RoomState::Recovery);
        assert_eq!(derive(3, 0, 4, true), RoomState::Recovery);
    }

    #[test]
    fn test_derive_empty_room_is_reset_point() {
        assert_eq!(derive(0, 0, 2, true), RoomState::AwaitingPlayers);
    }

    #[test]
    fn test_room_state_in_session() {
        assert!(!RoomState::AwaitingPlayers.in_session());
        assert!(!RoomState::AwaitingReady.in_session());
        assert!(RoomState::InGame.in_session());
        assert!(RoomState::Recovery.in_session());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::AwaitingReady.to_string(), "AwaitingReady");
    }
}
