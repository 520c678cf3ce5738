//! `RoomService`: the unary call surface.
//!
//! Every call resolves the caller's [`Connection`], locks its membership
//! slot for the whole call, and forwards to the room actor. Guard failures
//! come back as a [`ResponseStatus`] on the reply, never as an error.

use std::sync::Arc;

use tandem_protocol::{
    Call, ClientId, Reply, ResponseStatus, RoomId, RoomKind, SessionBlob,
};
use tandem_room::{RoomError, RoomRegistry};
use tandem_session::{Connection, ConnectionRegistry};

/// Owns both registries and implements each call against them.
#[derive(Debug)]
pub struct RoomService {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
}

impl RoomService {
    /// Creates a service with empty registries.
    pub fn new(outbox_capacity: usize, room_channel_size: usize) -> Self {
        Self {
            connections: ConnectionRegistry::new(outbox_capacity),
            rooms: RoomRegistry::new(room_channel_size),
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Admits a handshaken socket. `socket` becomes the connection's
    /// owner, taking it over from any earlier socket with the same id.
    pub async fn admit(&self, client_id: &ClientId, socket: u64) -> Arc<Connection> {
        let (conn, created) = self.connections.claim(client_id.clone(), socket).await;
        if !created {
            tracing::debug!(%client_id, socket, "client id already connected, taking it over");
        }
        conn
    }

    /// Resolves the caller's connection and records activity. If the
    /// reaper removed it since the handshake, it is registered again for
    /// `socket`.
    pub async fn connection(&self, client_id: &ClientId, socket: u64) -> Arc<Connection> {
        let (conn, _) = self.connections.resolve(client_id.clone(), socket).await;
        conn.touch();
        conn
    }

    /// Runs one unary call.
    ///
    /// `SubscribeMessages` only acknowledges here; the socket handler owns
    /// the stream it opens.
    pub async fn call(&self, conn: &Arc<Connection>, call: Call) -> Reply {
        match call {
            Call::CreateRoom { kind } => self.create_room(conn, kind).await,
            Call::JoinRoom { room_id } => self.join_room(conn, room_id).await,
            Call::LeaveRoom => self.leave_room(conn).await,
            Call::UpdateReady { ready } => self.update_ready(conn, ready).await,
            Call::AddPlayer { blob } => self.add_player(conn, blob).await,
            Call::SubscribeMessages => Reply::ok(),
        }
    }

    /// Creates a room of `kind` and joins the caller to it.
    pub async fn create_room(&self, conn: &Arc<Connection>, kind: RoomKind) -> Reply {
        let mut slot = conn.membership().await;
        if let Some(current) = slot.as_ref() {
            tracing::debug!(client_id = %conn.client_id(), room_id = %current, "create refused, already in a room");
            return Reply::status(ResponseStatus::AlreadyInRoom);
        }

        let handle = self.rooms.create_room(kind).await;
        let room_id = handle.room_id().clone();
        match handle.join(Arc::clone(conn)).await {
            Ok(roster) => {
                *slot = Some(room_id.clone());
                Reply::ok().with_room(room_id).with_roster(roster)
            }
            Err(e) => {
                tracing::warn!(client_id = %conn.client_id(), %room_id, error = %e, "creator could not join new room");
                self.rooms.collect_if_empty(&room_id).await;
                Reply::status(status_of(&e, ResponseStatus::RoomNotFound))
            }
        }
    }

    /// Joins the caller to an existing room.
    pub async fn join_room(&self, conn: &Arc<Connection>, room_id: RoomId) -> Reply {
        let mut slot = conn.membership().await;
        if slot.is_some() {
            return Reply::status(ResponseStatus::AlreadyInRoom);
        }

        let Some(handle) = self.rooms.lookup(&room_id).await else {
            tracing::debug!(client_id = %conn.client_id(), %room_id, "join of unknown room");
            return Reply::status(ResponseStatus::RoomNotFound);
        };
        match handle.join(Arc::clone(conn)).await {
            Ok(roster) => {
                *slot = Some(room_id.clone());
                Reply::ok().with_room(room_id).with_roster(roster)
            }
            Err(e) => Reply::status(status_of(&e, ResponseStatus::RoomNotFound)),
        }
    }

    /// Removes the caller from its room.
    pub async fn leave_room(&self, conn: &Arc<Connection>) -> Reply {
        let mut slot = conn.membership().await;
        let Some(room_id) = slot.take() else {
            return Reply::status(ResponseStatus::NoRoomJoinedYet);
        };
        self.leave(conn.client_id(), &room_id).await;
        Reply::ok()
    }

    /// Declares or retracts the caller's readiness.
    pub async fn update_ready(&self, conn: &Arc<Connection>, ready: bool) -> Reply {
        let slot = conn.membership().await;
        let Some(room_id) = slot.as_ref() else {
            return Reply::status(ResponseStatus::NoRoomJoinedYet);
        };
        let Some(handle) = self.rooms.lookup(room_id).await else {
            return Reply::status(ResponseStatus::NoRoomJoinedYet);
        };
        match handle.set_ready(conn.client_id().clone(), ready).await {
            Ok(_) => Reply::ok(),
            Err(e) => Reply::status(status_of(&e, ResponseStatus::NoRoomJoinedYet)),
        }
    }

    /// Attaches the caller's blob to its room's running session.
    pub async fn add_player(&self, conn: &Arc<Connection>, blob: SessionBlob) -> Reply {
        let slot = conn.membership().await;
        let Some(room_id) = slot.as_ref() else {
            return Reply::status(ResponseStatus::NoRoomJoinedYet);
        };
        let Some(handle) = self.rooms.lookup(room_id).await else {
            return Reply::status(ResponseStatus::NoRoomJoinedYet);
        };
        match handle.add_player(conn.client_id().clone(), blob).await {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::status(status_of(&e, ResponseStatus::NoRoomJoinedYet)),
        }
    }

    /// Forgets a client: removes its connection (ending any stream) and
    /// takes it out of its room. Returns `false` if it was not registered.
    ///
    /// The membership lock is taken after removal, so a call already in
    /// flight finishes first and its room is the one left here.
    pub async fn disconnect(&self, client_id: &ClientId) -> bool {
        match self.connections.remove(client_id).await {
            Some(conn) => {
                self.forget(&conn).await;
                true
            }
            None => false,
        }
    }

    /// Disconnects `client_id` on behalf of the socket `socket`, which
    /// is closing. Does nothing if a newer socket has taken the client
    /// over.
    pub async fn release(&self, client_id: &ClientId, socket: u64) -> bool {
        match self.connections.remove_owned(client_id, socket).await {
            Some(conn) => {
                self.forget(&conn).await;
                true
            }
            None => {
                tracing::debug!(%client_id, socket, "socket no longer owns its client, keeping it");
                false
            }
        }
    }

    async fn forget(&self, conn: &Connection) {
        let client_id = conn.client_id();
        let mut slot = conn.membership().await;
        if let Some(room_id) = slot.take() {
            self.leave(client_id, &room_id).await;
        }
        tracing::info!(%client_id, "client disconnected");
    }

    /// Leaves `room_id` and collects the room if that emptied it.
    async fn leave(&self, client_id: &ClientId, room_id: &RoomId) {
        let Some(handle) = self.rooms.lookup(room_id).await else {
            tracing::debug!(%client_id, %room_id, "room already gone on leave");
            return;
        };
        match handle.leave(client_id.clone()).await {
            Ok(roster) if roster.members.is_empty() => {
                self.rooms.collect_if_empty(room_id).await;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(%client_id, %room_id, error = %e, "leave failed"),
        }
    }
}

/// Maps a room call failure to the status the client sees. `unavailable`
/// is used when the room actor has gone away.
fn status_of(err: &RoomError, unavailable: ResponseStatus) -> ResponseStatus {
    match err {
        RoomError::Rejected(rejection) => rejection.status(),
        RoomError::Unavailable(_) => unavailable,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_protocol::EventKind;
    use tandem_room::RoomState;

    use super::*;

    fn service() -> RoomService {
        RoomService::new(16, 16)
    }

    async fn client(service: &RoomService, raw: &str) -> Arc<Connection> {
        service.connection(&ClientId::parse(raw).unwrap(), 1).await
    }

    async fn next_kind(conn: &Connection) -> EventKind {
        tokio::time::timeout(Duration::from_secs(1), conn.outbox().next())
            .await
            .expect("event should arrive")
            .expect("outbox open")
            .kind
    }

    async fn room_state(service: &RoomService, room_id: &RoomId) -> RoomState {
        let handle = service.rooms().lookup(room_id).await.unwrap();
        handle.info().await.unwrap().state
    }

    // =====================================================================
    // CreateRoom / JoinRoom
    // =====================================================================

    #[tokio::test]
    async fn test_create_room_joins_creator() {
        let service = service();
        let alice = client(&service, "ALICE").await;

        let reply = service.create_room(&alice, RoomKind::Duo).await;

        assert!(reply.status.is_ok());
        let room_id = reply.room_id.unwrap();
        assert_eq!(reply.roster.unwrap().members, vec![alice.client_id().clone()]);
        assert_eq!(alice.current_room().await, Some(room_id));
    }

    #[tokio::test]
    async fn test_create_room_twice_is_already_in_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        service.create_room(&alice, RoomKind::Duo).await;

        let reply = service.create_room(&alice, RoomKind::Duo).await;

        assert_eq!(reply.status, ResponseStatus::AlreadyInRoom);
        assert_eq!(service.rooms().len().await, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;

        let reply = service.join_room(&alice, RoomId::parse("ZZZZZZ")).await;

        assert_eq!(reply.status, ResponseStatus::RoomNotFound);
        assert_eq!(alice.current_room().await, None);
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        let bob = client(&service, "BOB").await;
        let carol = client(&service, "CAROL").await;
        let room_id = service.create_room(&alice, RoomKind::Duo).await.room_id.unwrap();
        assert!(service.join_room(&bob, room_id.clone()).await.status.is_ok());

        let reply = service.join_room(&carol, room_id).await;

        assert_eq!(reply.status, ResponseStatus::RoomFull);
        assert_eq!(carol.current_room().await, None);
    }

    #[tokio::test]
    async fn test_join_notifies_creator() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        let bob = client(&service, "BOB").await;
        let room_id = service.create_room(&alice, RoomKind::Duo).await.room_id.unwrap();

        let reply = service.join_room(&bob, room_id.clone()).await;

        assert!(reply.status.is_ok());
        assert_eq!(reply.roster.unwrap().members.len(), 2);
        assert_eq!(next_kind(&alice).await, EventKind::OpponentJoined);
        assert_eq!(room_state(&service, &room_id).await, RoomState::AwaitingReady);
    }

    // =====================================================================
    // LeaveRoom
    // =====================================================================

    #[tokio::test]
    async fn test_leave_without_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;

        let reply = service.leave_room(&alice).await;

        assert_eq!(reply.status, ResponseStatus::NoRoomJoinedYet);
    }

    #[tokio::test]
    async fn test_leave_last_member_collects_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        let room_id = service.create_room(&alice, RoomKind::Duo).await.room_id.unwrap();

        let reply = service.leave_room(&alice).await;

        assert!(reply.status.is_ok());
        assert!(service.rooms().lookup(&room_id).await.is_none());
        assert_eq!(alice.current_room().await, None);
    }

    // =====================================================================
    // UpdateReady / AddPlayer
    // =====================================================================

    #[tokio::test]
    async fn test_update_ready_without_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;

        let reply = service.update_ready(&alice, true).await;

        assert_eq!(reply.status, ResponseStatus::NoRoomJoinedYet);
    }

    #[tokio::test]
    async fn test_update_ready_in_game_is_session_in_progress() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        service.create_room(&alice, RoomKind::Solo).await;
        assert!(service.update_ready(&alice, true).await.status.is_ok());

        let reply = service.update_ready(&alice, false).await;

        assert_eq!(reply.status, ResponseStatus::SessionInProgress);
    }

    #[tokio::test]
    async fn test_add_player_before_session() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        service.create_room(&alice, RoomKind::Duo).await;

        let reply = service.add_player(&alice, SessionBlob(vec![1])).await;

        assert_eq!(reply.status, ResponseStatus::SessionNotStarted);
    }

    #[tokio::test]
    async fn test_add_player_without_room() {
        let service = service();
        let alice = client(&service, "ALICE").await;

        let reply = service.add_player(&alice, SessionBlob(vec![1])).await;

        assert_eq!(reply.status, ResponseStatus::NoRoomJoinedYet);
    }

    #[tokio::test]
    async fn test_add_player_in_session() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        let room_id = service.create_room(&alice, RoomKind::Solo).await.room_id.unwrap();
        service.update_ready(&alice, true).await;

        let reply = service.add_player(&alice, SessionBlob(vec![1, 2])).await;

        assert!(reply.status.is_ok());
        let handle = service.rooms().lookup(&room_id).await.unwrap();
        assert_eq!(
            handle.info().await.unwrap().session_players,
            vec![alice.client_id().clone()]
        );
    }

    // =====================================================================
    // Disconnect
    // =====================================================================

    #[tokio::test]
    async fn test_disconnect_mid_game_enters_recovery() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        let bob = client(&service, "BOB").await;
        let room_id = service.create_room(&alice, RoomKind::Duo).await.room_id.unwrap();
        service.join_room(&bob, room_id.clone()).await;
        service.update_ready(&alice, true).await;
        service.update_ready(&bob, true).await;
        assert_eq!(room_state(&service, &room_id).await, RoomState::InGame);

        assert!(service.disconnect(bob.client_id()).await);

        assert_eq!(room_state(&service, &room_id).await, RoomState::Recovery);
        assert!(service.connections().lookup(bob.client_id()).await.is_none());
        assert!(bob.outbox().is_closed());

        // OpponentJoined, OpponentReady, GameStarted, then the departure.
        for _ in 0..3 {
            next_kind(&alice).await;
        }
        assert_eq!(next_kind(&alice).await, EventKind::OpponentLeft);

        let carol = client(&service, "CAROL").await;
        let reply = service.join_room(&carol, room_id).await;
        assert_eq!(reply.status, ResponseStatus::SessionInProgress);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_client() {
        let service = service();
        assert!(!service.disconnect(&ClientId::parse("GHOST").unwrap()).await);
    }

    #[tokio::test]
    async fn test_release_by_replaced_socket_keeps_membership() {
        let service = service();
        let alice_id = ClientId::parse("ALICE").unwrap();
        let first = service.admit(&alice_id, 1).await;
        let room_id = service.create_room(&first, RoomKind::Duo).await.room_id.unwrap();
        let second = service.admit(&alice_id, 2).await;
        assert!(Arc::ptr_eq(&first, &second));

        assert!(!service.release(&alice_id, 1).await);
        assert_eq!(second.current_room().await, Some(room_id.clone()));

        assert!(service.release(&alice_id, 2).await);
        assert!(service.rooms().lookup(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn test_connection_reregisters_after_disconnect() {
        let service = service();
        let alice = client(&service, "ALICE").await;
        service.disconnect(alice.client_id()).await;

        let again = client(&service, "ALICE").await;

        assert!(!Arc::ptr_eq(&alice, &again));
        assert!(!again.outbox().is_closed());
    }
}
