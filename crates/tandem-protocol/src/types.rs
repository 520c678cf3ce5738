//! Frame types for Tandem's wire format.
//!
//! Every WebSocket message is exactly one frame: a [`ClientFrame`] going up
//! or a [`ServerFrame`] coming down. Unary calls ride inside
//! `ClientFrame::Request` and are answered by a `ServerFrame::Reply` with
//! the same `id`; room events are pushed as `ServerFrame::Event` once the
//! client has subscribed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClientId, RoomId};

/// Version carried in the handshake. The server rejects any other value.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Room kinds and rosters
// ---------------------------------------------------------------------------

/// How many participants a room needs before it can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RoomKind {
    /// Two participants. The common case.
    #[default]
    Duo,
    /// Four participants.
    Squad,
    /// A single participant; lets one client exercise the whole lifecycle.
    Solo,
}

impl RoomKind {
    /// Number of members that makes the room full.
    pub fn required_members(self) -> usize {
        match self {
            Self::Duo => 2,
            Self::Squad => 4,
            Self::Solo => 1,
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Duo => "duo",
            Self::Squad => "squad",
            Self::Solo => "solo",
        };
        f.write_str(name)
    }
}

/// A snapshot of a room's membership, attached to every event and to the
/// create/join replies.
///
/// Clients re-derive their view of the lobby from this rather than from the
/// event kind alone, so a dropped or coalesced event can't leave them stuck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Roster {
    /// Members in join order.
    pub members: Vec<ClientId>,
    /// The subset of `members` that declared readiness.
    pub ready: Vec<ClientId>,
    /// Members needed to fill the room.
    pub required: usize,
}

impl Roster {
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.required
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.members.contains(client)
    }

    pub fn is_ready(&self, client: &ClientId) -> bool {
        self.ready.contains(client)
    }

    /// `true` when every member except `me` is ready.
    pub fn others_ready(&self, me: &ClientId) -> bool {
        self.members
            .iter()
            .filter(|m| *m != me)
            .all(|m| self.ready.contains(m))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    OpponentJoined,
    OpponentReady,
    OpponentRevertedReady,
    OpponentLeft,
    GameStarted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A room event pushed to a member's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub room_id: RoomId,
    /// The member whose action caused the event.
    pub from: ClientId,
    /// Membership after the event was committed.
    pub roster: Roster,
}

// ---------------------------------------------------------------------------
// Calls and replies
// ---------------------------------------------------------------------------

/// Opaque per-participant data stored in a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SessionBlob(pub Vec<u8>);

/// A unary operation requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Call {
    /// Create a room of the given kind and join it.
    CreateRoom {
        #[serde(default)]
        kind: RoomKind,
    },
    /// Join an existing room by code.
    JoinRoom { room_id: RoomId },
    /// Leave the current room.
    LeaveRoom,
    /// Declare or retract readiness.
    UpdateReady { ready: bool },
    /// Open the event stream on this socket.
    SubscribeMessages,
    /// Attach this participant's blob to the running session.
    AddPlayer { blob: SessionBlob },
}

impl Call {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "CreateRoom",
            Self::JoinRoom { .. } => "JoinRoom",
            Self::LeaveRoom => "LeaveRoom",
            Self::UpdateReady { .. } => "UpdateReady",
            Self::SubscribeMessages => "SubscribeMessages",
            Self::AddPlayer { .. } => "AddPlayer",
        }
    }
}

/// Outcome of a unary call.
///
/// Expected failures (unknown room, room full, ...) are statuses on a
/// successful reply, not protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    RoomNotFound,
    NoRoomJoinedYet,
    RoomFull,
    AlreadyInRoom,
    SessionInProgress,
    SessionNotStarted,
}

impl ResponseStatus {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::NoRoomJoinedYet => "NO_ROOM_JOINED_YET",
            Self::RoomFull => "ROOM_FULL",
            Self::AlreadyInRoom => "ALREADY_IN_ROOM",
            Self::SessionInProgress => "SESSION_IN_PROGRESS",
            Self::SessionNotStarted => "SESSION_NOT_STARTED",
        };
        f.write_str(name)
    }
}

/// Reply body for every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ResponseStatus,
    /// Set by `CreateRoom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Set by `CreateRoom` and `JoinRoom` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster: Option<Roster>,
}

impl Reply {
    pub fn ok() -> Self {
        Self::status(ResponseStatus::Ok)
    }

    pub fn status(status: ResponseStatus) -> Self {
        Self {
            status,
            room_id: None,
            roster: None,
        }
    }

    pub fn with_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = Some(roster);
        self
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Transport-level failure codes sent in `ServerFrame::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or malformed client id in the handshake.
    Unauthenticated,
    /// The server is shutting down.
    Unavailable,
    /// A frame the server can't accept (bad version, undecodable, or a
    /// request before the handshake).
    InvalidArgument,
    /// A unary call ran past its deadline.
    DeadlineExceeded,
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// First frame on every socket. `client_id` is validated by the server;
    /// it's kept raw here so a bad id can be answered with
    /// `Unauthenticated` rather than a decode failure.
    Handshake {
        version: u32,
        client_id: Option<String>,
    },
    Request { id: u64, call: Call },
    Disconnect { reason: String },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// `server_time` is milliseconds since the server started.
    HandshakeAck {
        client_id: ClientId,
        server_time: u64,
    },
    Reply { id: u64, reply: Reply },
    /// `seq` counts events on this stream starting from 1.
    Event { seq: u64, event: ServerEvent },
    /// `id` names the request that failed, when there is one.
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(raw: &str) -> ClientId {
        ClientId::parse(raw).unwrap()
    }

    fn roster(members: &[&str], ready: &[&str], required: usize) -> Roster {
        Roster {
            members: members.iter().map(|m| client(m)).collect(),
            ready: ready.iter().map(|m| client(m)).collect(),
            required,
        }
    }

    // =====================================================================
    // RoomKind / Roster
    // =====================================================================

    #[test]
    fn test_room_kind_required_members() {
        assert_eq!(RoomKind::Duo.required_members(), 2);
        assert_eq!(RoomKind::Squad.required_members(), 4);
        assert_eq!(RoomKind::Solo.required_members(), 1);
    }

    #[test]
    fn test_room_kind_default_is_duo() {
        assert_eq!(RoomKind::default(), RoomKind::Duo);
    }

    #[test]
    fn test_roster_is_full() {
        assert!(!roster(&["A"], &[], 2).is_full());
        assert!(roster(&["A", "B"], &[], 2).is_full());
    }

    #[test]
    fn test_roster_others_ready_ignores_self() {
        let r = roster(&["A", "B", "C"], &["B", "C"], 3);
        assert!(r.others_ready(&client("A")));
        assert!(!r.others_ready(&client("B")));
    }

    // =====================================================================
    // JSON shapes
    // =====================================================================

    #[test]
    fn test_handshake_json_format() {
        let frame = ClientFrame::Handshake {
            version: PROTOCOL_VERSION,
            client_id: Some("ALICE".into()),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "Handshake");
        assert_eq!(json["version"], 1);
        assert_eq!(json["client_id"], "ALICE");
    }

    #[test]
    fn test_request_json_nests_tagged_call() {
        let frame = ClientFrame::Request {
            id: 7,
            call: Call::UpdateReady { ready: true },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "Request");
        assert_eq!(json["id"], 7);
        assert_eq!(json["call"]["type"], "UpdateReady");
        assert_eq!(json["call"]["ready"], true);
    }

    #[test]
    fn test_create_room_kind_defaults_to_duo() {
        let call: Call = serde_json::from_str(r#"{"type":"CreateRoom"}"#).unwrap();
        assert_eq!(call, Call::CreateRoom { kind: RoomKind::Duo });
    }

    #[test]
    fn test_join_room_normalizes_code_on_decode() {
        let call: Call =
            serde_json::from_str(r#"{"type":"JoinRoom","room_id":" abc234 "}"#)
                .unwrap();
        assert_eq!(
            call,
            Call::JoinRoom {
                room_id: RoomId::parse("ABC234")
            }
        );
    }

    #[test]
    fn test_reply_omits_empty_fields() {
        let json =
            serde_json::to_value(Reply::status(ResponseStatus::RoomFull)).unwrap();
        assert_eq!(json["status"], "ROOM_FULL");
        assert!(json.get("room_id").is_none());
        assert!(json.get("roster").is_none());
    }

    #[test]
    fn test_response_status_display_matches_wire() {
        for status in [
            ResponseStatus::Ok,
            ResponseStatus::NoRoomJoinedYet,
            ResponseStatus::SessionNotStarted,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.to_string());
        }
    }

    #[test]
    fn test_event_frame_json_format() {
        let frame = ServerFrame::Event {
            seq: 3,
            event: ServerEvent {
                kind: EventKind::OpponentJoined,
                room_id: RoomId::parse("K7QX2M"),
                from: client("BOB"),
                roster: roster(&["ALICE", "BOB"], &[], 2),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "Event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["event"]["kind"], "OpponentJoined");
        assert_eq!(json["event"]["room_id"], "K7QX2M");
        assert_eq!(json["event"]["roster"]["members"][1], "BOB");
    }

    #[test]
    fn test_session_blob_is_plain_byte_array() {
        let call = Call::AddPlayer {
            blob: SessionBlob(vec![1, 2]),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["blob"], serde_json::json!([1, 2]));
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_decode_unknown_call_type_returns_error() {
        let result: Result<Call, _> =
            serde_json::from_str(r#"{"type":"FlyToMoon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_ack_with_invalid_client_id_returns_error() {
        let result: Result<ServerFrame, _> = serde_json::from_str(
            r#"{"type":"HandshakeAck","client_id":"has space","server_time":0}"#,
        );
        assert!(result.is_err());
    }
}
