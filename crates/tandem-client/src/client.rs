//! Async client for a Tandem server.
//!
//! [`TandemClient`] owns one WebSocket. A background reader task routes
//! replies to the waiting caller by request id and feeds pushed events to
//! the [`Mirror`]. Room operations are speculative: the mirror moves first
//! and is rolled back if the call fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tandem_protocol::{
    Call, ClientFrame, ClientId, Codec, ErrorCode, JsonCodec, PROTOCOL_VERSION, ProtocolError,
    Reply, RoomId, RoomKind, Roster, ServerFrame, SessionBlob,
};
use tandem_transport::{ClientConnection, Connection as _};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{ClientConfig, ClientError, Connectivity, LocalEvent, Mirror, MirrorState};

type Pending = Mutex<HashMap<u64, oneshot::Sender<Result<Reply, ClientError>>>>;

struct Shared {
    socket: ClientConnection,
    codec: JsonCodec,
    pending: Pending,
    next_id: AtomicU64,
    mirror: Mirror,
}

impl Shared {
    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Result<Reply, ClientError>>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

/// A connected, subscribed participant.
///
/// # Example
///
/// ```rust,no_run
/// use tandem_client::{ClientConfig, TandemClient};
/// use tandem_protocol::RoomKind;
///
/// # async fn run() -> Result<(), tandem_client::ClientError> {
/// let client = TandemClient::connect(ClientConfig::new("ws://127.0.0.1:7700")).await?;
/// let room_id = client.create_room(RoomKind::Duo).await?;
/// println!("share this code: {room_id}");
/// client.update_ready(true).await?;
/// # Ok(())
/// # }
/// ```
pub struct TandemClient {
    shared: Arc<Shared>,
    config: ClientConfig,
    reader: JoinHandle<()>,
}

impl TandemClient {
    /// Connects, performs the handshake, and opens the event stream.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let socket = tandem_transport::connect(&config.url).await?;
        let codec = JsonCodec;

        let hello = ClientFrame::Handshake {
            version: PROTOCOL_VERSION,
            client_id: Some(config.client_id.to_string()),
        };
        socket.send(&codec.encode(&hello)?).await?;

        let ack = tokio::time::timeout(config.handshake_timeout, socket.recv())
            .await
            .map_err(|_| ClientError::Timeout { call: "Handshake" })??
            .ok_or(ClientError::Disconnected)?;
        let client_id = match codec.decode::<ServerFrame>(&ack)? {
            ServerFrame::HandshakeAck { client_id, .. } => client_id,
            ServerFrame::Error { code, message, .. } => {
                return Err(ClientError::Server { code, message });
            }
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "expected HandshakeAck, got {other:?}"
                ))
                .into());
            }
        };
        tracing::info!(%client_id, url = %config.url, "connected");

        let shared = Arc::new(Shared {
            socket,
            codec,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            mirror: Mirror::new(client_id),
        });
        let reader = tokio::spawn(read_frames(Arc::clone(&shared)));
        let client = Self {
            shared,
            config,
            reader,
        };

        client.request(Call::SubscribeMessages).await?.ok_status()?;
        client.shared.mirror.set_connectivity(Connectivity::Connected);
        Ok(client)
    }

    pub fn client_id(&self) -> &ClientId {
        self.shared.mirror.client_id()
    }

    pub fn mirror(&self) -> &Mirror {
        &self.shared.mirror
    }

    pub fn state(&self) -> MirrorState {
        self.shared.mirror.state()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.shared.mirror.connectivity()
    }

    /// Runs `observer` after every mirror or connectivity change.
    pub fn subscribe(&self, observer: impl Fn(MirrorState, Connectivity) + Send + Sync + 'static) {
        self.shared.mirror.subscribe(observer);
    }

    /// Creates a room and joins it. Returns the code to share.
    pub async fn create_room(&self, kind: RoomKind) -> Result<RoomId, ClientError> {
        let (reply, epoch) = self
            .speculate(LocalEvent::SelfJoined, Call::CreateRoom { kind })
            .await?;
        if let Some(roster) = &reply.roster {
            self.shared.mirror.reconcile(roster, epoch);
        }
        reply
            .room_id
            .ok_or_else(|| ProtocolError::InvalidMessage("create reply without room id".into()).into())
    }

    /// Joins a room by its code as typed by a user.
    pub async fn join_room(&self, code: &str) -> Result<Roster, ClientError> {
        let room_id = RoomId::parse(code);
        let (reply, epoch) = self
            .speculate(LocalEvent::SelfJoined, Call::JoinRoom { room_id })
            .await?;
        let roster = reply.roster.unwrap_or_default();
        self.shared.mirror.reconcile(&roster, epoch);
        Ok(roster)
    }

    pub async fn leave_room(&self) -> Result<(), ClientError> {
        self.speculate(LocalEvent::SelfLeft, Call::LeaveRoom).await?;
        Ok(())
    }

    pub async fn update_ready(&self, ready: bool) -> Result<(), ClientError> {
        let event = if ready {
            LocalEvent::SelfReady
        } else {
            LocalEvent::SelfRevertedReady
        };
        self.speculate(event, Call::UpdateReady { ready }).await?;
        Ok(())
    }

    /// Publishes this participant's blob to the running session.
    pub async fn add_player(&self, blob: SessionBlob) -> Result<(), ClientError> {
        self.request(Call::AddPlayer { blob }).await?.ok_status()?;
        Ok(())
    }

    /// Says goodbye and closes the socket.
    pub async fn close(self) -> Result<(), ClientError> {
        let bye = ClientFrame::Disconnect {
            reason: "client closed".into(),
        };
        let bytes = self.shared.codec.encode(&bye)?;
        self.shared.socket.send(&bytes).await?;
        self.shared.socket.close().await?;
        Ok(())
    }

    /// Applies `event` to the mirror, runs `call`, and commits or rolls
    /// back depending on the outcome. Returns the reply with the mirror's
    /// event epoch from before the call.
    ///
    /// If this future is dropped mid-call the speculation rolls back.
    async fn speculate(&self, event: LocalEvent, call: Call) -> Result<(Reply, u64), ClientError> {
        let speculation = self.shared.mirror.attempt(event)?;
        let epoch = speculation.epoch();
        match self.request(call).await.and_then(Reply::ok_status) {
            Ok(reply) => {
                self.shared.mirror.commit(speculation);
                Ok((reply, epoch))
            }
            Err(e) => {
                tracing::debug!(client_id = %self.client_id(), %event, error = %e, "call failed, rolling back");
                self.shared.mirror.rollback(speculation);
                Err(e)
            }
        }
    }

    /// Sends one call and waits for its reply, whatever the status.
    async fn request(&self, call: Call) -> Result<Reply, ClientError> {
        let name = call.name();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, reply_tx);

        let sent = async {
            let bytes = self.shared.codec.encode(&ClientFrame::Request { id, call })?;
            self.shared.socket.send(&bytes).await?;
            Ok::<_, ClientError>(())
        }
        .await;
        if let Err(e) = sent {
            self.shared.take_pending(id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.shared.take_pending(id);
                Err(ClientError::Timeout { call: name })
            }
        }
    }
}

impl Drop for TandemClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

trait ReplyExt: Sized {
    fn ok_status(self) -> Result<Self, ClientError>;
}

impl ReplyExt for Reply {
    /// Turns a non-OK status into `ClientError::Status`.
    fn ok_status(self) -> Result<Self, ClientError> {
        if self.status.is_ok() {
            Ok(self)
        } else {
            Err(ClientError::Status(self.status))
        }
    }
}

/// Reads frames until the socket closes.
async fn read_frames(shared: Arc<Shared>) {
    let client_id = shared.mirror.client_id().clone();
    loop {
        let data = match shared.socket.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%client_id, "server closed the stream");
                break;
            }
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "recv error");
                break;
            }
        };

        let frame: ServerFrame = match shared.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "failed to decode frame");
                continue;
            }
        };

        match frame {
            ServerFrame::Reply { id, reply } => match shared.take_pending(id) {
                Some(waiter) => {
                    let _ = waiter.send(Ok(reply));
                }
                None => tracing::debug!(%client_id, id, "reply for unknown request"),
            },
            ServerFrame::Event { seq, event } => {
                tracing::debug!(%client_id, seq, kind = %event.kind, "event received");
                shared.mirror.apply_remote(&event);
            }
            ServerFrame::Error {
                code,
                message,
                id: Some(id),
            } => {
                if let Some(waiter) = shared.take_pending(id) {
                    let _ = waiter.send(Err(ClientError::Server { code, message }));
                }
            }
            ServerFrame::Error {
                code: ErrorCode::Unavailable,
                message,
                id: None,
            } => {
                tracing::warn!(%client_id, %message, "server unavailable");
                break;
            }
            ServerFrame::Error { code, message, id: None } => {
                tracing::warn!(%client_id, ?code, %message, "server error");
            }
            ServerFrame::HandshakeAck { .. } => {
                tracing::debug!(%client_id, "ignoring repeated HandshakeAck");
            }
        }
    }

    shared.mirror.set_connectivity(Connectivity::Disconnected);
    // Dropping the senders wakes every waiter with `Disconnected`.
    shared
        .pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
