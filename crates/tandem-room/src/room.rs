//! Room actor: an isolated Tokio task that owns one room.
//!
//! Every operation on a room is a command sent over its mpsc channel, so
//! evaluating a lifecycle guard and committing the result happen inside a
//! single task with no interleaving. The actor delivers resulting events by
//! pushing into members' outboxes, which never blocks.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_protocol::{ClientId, RoomId, RoomKind, Roster, ServerEvent, SessionBlob};
use tandem_session::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::lifecycle::{Effect, Recipients, RoomEvent, RoomView};
use crate::{Rejection, RoomError, RoomState, SessionPayload};

type Reply<T> = oneshot::Sender<Result<T, Rejection>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        conn: Arc<Connection>,
        reply: Reply<Roster>,
    },
    Leave {
        client_id: ClientId,
        reply: Reply<Roster>,
    },
    SetReady {
        client_id: ClientId,
        ready: bool,
        reply: Reply<Roster>,
    },
    AddPlayer {
        client_id: ClientId,
        blob: SessionBlob,
        reply: Reply<()>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    /// Stop the actor if, and only if, the room has no members.
    CloseIfEmpty {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// A snapshot of a room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub state: RoomState,
    pub roster: Roster,
    /// Members that have published a session blob. Empty outside a session.
    pub session_players: Vec<ClientId>,
}

/// Handle to a running room actor.
///
/// Cheap to clone; the [`RoomRegistry`](crate::RoomRegistry) holds one per
/// room and hands out copies.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    kind: RoomKind,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Adds the connection's client as a member. Returns the roster after
    /// the join.
    pub async fn join(&self, conn: Arc<Connection>) -> Result<Roster, RoomError> {
        Ok(self.request(|reply| RoomCommand::Join { conn, reply }).await??)
    }

    pub async fn leave(&self, client_id: ClientId) -> Result<Roster, RoomError> {
        Ok(self
            .request(|reply| RoomCommand::Leave { client_id, reply })
            .await??)
    }

    pub async fn set_ready(&self, client_id: ClientId, ready: bool) -> Result<Roster, RoomError> {
        Ok(self
            .request(|reply| RoomCommand::SetReady {
                client_id,
                ready,
                reply,
            })
            .await??)
    }

    /// Stores a member's blob in the running session.
    pub async fn add_player(&self, client_id: ClientId, blob: SessionBlob) -> Result<(), RoomError> {
        Ok(self
            .request(|reply| RoomCommand::AddPlayer {
                client_id,
                blob,
                reply,
            })
            .await??)
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Stops the actor if the room is empty. Returns whether it stopped.
    pub async fn close_if_empty(&self) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::CloseIfEmpty { reply })
            .await
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    kind: RoomKind,
    view: RoomView,
    /// Outbox owners, keyed like the view's seats.
    connections: HashMap<ClientId, Arc<Connection>>,
    payload: Option<SessionPayload>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop, processing commands until shutdown.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, kind = %self.kind, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { conn, reply } => {
                    let event = RoomEvent::Join(conn.client_id().clone());
                    let result = self.handle(event, Some(conn));
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { client_id, reply } => {
                    let result = self.handle(RoomEvent::Leave(client_id), None);
                    let _ = reply.send(result);
                }
                RoomCommand::SetReady {
                    client_id,
                    ready,
                    reply,
                } => {
                    let result = self.handle(RoomEvent::SetReady(client_id, ready), None);
                    let _ = reply.send(result);
                }
                RoomCommand::AddPlayer {
                    client_id,
                    blob,
                    reply,
                } => {
                    let _ = reply.send(self.add_player(client_id, blob));
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::CloseIfEmpty { reply } => {
                    let empty = self.view.is_empty();
                    let _ = reply.send(empty);
                    if empty {
                        tracing::debug!(room_id = %self.room_id, "empty room closed");
                        break;
                    }
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Runs one lifecycle event: guard, commit, then effects.
    fn handle(
        &mut self,
        event: RoomEvent,
        joining: Option<Arc<Connection>>,
    ) -> Result<Roster, Rejection> {
        let before = self.view.state();
        let effects = match self.view.apply(&event) {
            Ok(effects) => effects,
            Err(rejection) => {
                tracing::debug!(
                    room_id = %self.room_id,
                    client_id = %event.client(),
                    %rejection,
                    "room event rejected"
                );
                return Err(rejection);
            }
        };

        let client_id = event.client();
        match &event {
            RoomEvent::Join(_) => {
                if let Some(conn) = joining {
                    self.connections.insert(client_id.clone(), conn);
                }
                tracing::info!(
                    room_id = %self.room_id,
                    %client_id,
                    members = self.view.len(),
                    "member joined"
                );
            }
            RoomEvent::Leave(_) => {
                self.connections.remove(client_id);
                tracing::info!(
                    room_id = %self.room_id,
                    %client_id,
                    members = self.view.len(),
                    "member left"
                );
            }
            RoomEvent::SetReady(_, ready) => {
                tracing::debug!(room_id = %self.room_id, %client_id, ready, "readiness updated");
            }
        }

        let after = self.view.state();
        if before != after {
            tracing::info!(room_id = %self.room_id, from = %before, to = %after, "room state changed");
        }

        self.perform(client_id, effects);
        Ok(self.view.roster())
    }

    fn perform(&mut self, from: &ClientId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartSession => {
                    self.payload = Some(SessionPayload::new());
                    tracing::info!(room_id = %self.room_id, "session started");
                }
                Effect::ResetSession => {
                    if let Some(payload) = self.payload.take() {
                        tracing::info!(
                            room_id = %self.room_id,
                            age_ms = payload.age().as_millis() as u64,
                            "session discarded"
                        );
                    }
                }
                Effect::Notify { to, kind } => {
                    let event = ServerEvent {
                        kind,
                        room_id: self.room_id.clone(),
                        from: from.clone(),
                        roster: self.view.roster(),
                    };
                    for (client_id, conn) in &self.connections {
                        let excluded = matches!(&to, Recipients::Others(c) if c == client_id);
                        if !excluded {
                            conn.deliver(event.clone());
                        }
                    }
                }
            }
        }
    }

    fn add_player(&mut self, client_id: ClientId, blob: SessionBlob) -> Result<(), Rejection> {
        if !self.view.is_member(&client_id) {
            return Err(Rejection::NotMember);
        }
        let payload = self.payload.as_mut().ok_or(Rejection::NoSession)?;
        payload.insert(client_id.clone(), blob);
        tracing::info!(room_id = %self.room_id, %client_id, "player added to session");
        Ok(())
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            kind: self.kind,
            state: self.view.state(),
            roster: self.view.roster(),
            session_players: self
                .payload
                .as_ref()
                .map(SessionPayload::players)
                .unwrap_or_default(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `channel_size` bounds the command queue; senders wait when it's full.
pub(crate) fn spawn_room(room_id: RoomId, kind: RoomKind, channel_size: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));

    let actor = RoomActor {
        room_id: room_id.clone(),
        kind,
        view: RoomView::new(kind.required_members()),
        connections: HashMap::new(),
        payload: None,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        kind,
        sender: tx,
    }
}
