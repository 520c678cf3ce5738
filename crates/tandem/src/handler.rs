//! Per-socket handler: handshake, admission, and call routing.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → check version, validate the client id
//!   2. Admit the connection, taking it over from any older socket with
//!      the same client id → send HandshakeAck
//!   3. Loop: receive requests → run calls under the deadline, or open the
//!      event stream on `SubscribeMessages`

use std::sync::Arc;
use std::time::Duration;

use tandem_protocol::{
    Call, ClientFrame, ClientId, Codec, ErrorCode, PROTOCOL_VERSION, ProtocolError, Reply,
    ServerFrame,
};
use tandem_session::{ClientIdValidator, Connection, StreamLease};
use tandem_transport::{Connection as _, WebSocketConnection};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::dispatch::{PumpExit, SocketSink, pump_events};
use crate::server::{ServerState, stop_requested};
use crate::TandemError;

/// Drop guard that releases the client when the handler exits.
///
/// Cleanup happens even if the handler panics. `Drop` is synchronous, so
/// the release runs on a spawned task. A newer socket that took the
/// client id over keeps the connection.
struct ConnectionGuard<V: ClientIdValidator, C: Codec> {
    client_id: ClientId,
    socket: u64,
    state: Arc<ServerState<V, C>>,
}

impl<V: ClientIdValidator, C: Codec> Drop for ConnectionGuard<V, C> {
    fn drop(&mut self) {
        let client_id = self.client_id.clone();
        let socket = self.socket;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.service.release(&client_id, socket).await;
        });
    }
}

/// The event stream opened on this socket, if any.
struct Stream {
    /// Dropping this ends the pump with `PumpExit::Cancelled`.
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Stream {
    /// False once the pump has stopped, e.g. after a takeover.
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Why the request loop ended.
enum LoopExit {
    Closed,
    Shutdown,
}

/// Handles a single socket from accept to close.
pub(crate) async fn handle_connection<V, C>(
    socket: WebSocketConnection,
    state: Arc<ServerState<V, C>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TandemError>
where
    V: ClientIdValidator,
    C: Codec + Clone,
{
    let socket = Arc::new(socket);
    let conn_id = socket.id();
    let socket_id = conn_id.into_inner();
    tracing::debug!(%conn_id, "handling new socket");

    // --- Step 1: Handshake ---
    let client_id = perform_handshake(&socket, &state).await?;
    tracing::info!(%conn_id, %client_id, "client admitted");

    let _guard = ConnectionGuard {
        client_id: client_id.clone(),
        socket: socket_id,
        state: Arc::clone(&state),
    };

    // --- Step 2: Request loop ---
    let mut stream: Option<Stream> = None;
    let exit = loop {
        let idle = state.config.idle_timeout;
        let streaming = stream.as_ref().is_some_and(Stream::is_live);
        let received = tokio::select! {
            biased;
            () = stop_requested(&mut shutdown) => break LoopExit::Shutdown,
            received = recv_with_idle(&socket, idle, streaming) => received,
        };

        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%client_id, "socket closed cleanly");
                break LoopExit::Closed;
            }
            Ok(Err(e)) => {
                tracing::debug!(%client_id, error = %e, "recv error");
                break LoopExit::Closed;
            }
            Err(_) => {
                tracing::info!(%client_id, "socket idle, closing");
                break LoopExit::Closed;
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "failed to decode frame");
                send_error(&socket, &state.codec, ErrorCode::InvalidArgument, &e.to_string(), None)
                    .await?;
                continue;
            }
        };

        match frame {
            ClientFrame::Request { id, call: Call::SubscribeMessages } => {
                // The lease is taken before the ack, so an acked subscriber
                // always owns the stream. The pump starts after the ack.
                let lease = if stream.as_ref().is_some_and(Stream::is_live) {
                    None
                } else {
                    let conn = state.service.connection(&client_id, socket_id).await;
                    let lease = conn.open_stream();
                    Some((conn, lease))
                };
                let ack = ServerFrame::Reply { id, reply: Reply::ok() };
                if let Err(e) = send_frame(&socket, &state.codec, &ack).await {
                    if let Some((conn, lease)) = lease {
                        conn.close_stream(&lease);
                    }
                    return Err(e);
                }
                if let Some((conn, lease)) = lease {
                    stream = Some(open_stream(&socket, &state, conn, lease, socket_id, shutdown.clone()));
                }
            }
            ClientFrame::Request { id, call } => {
                handle_request(&socket, &state, &client_id, socket_id, id, call).await?;
            }
            ClientFrame::Handshake { .. } => {
                send_error(&socket, &state.codec, ErrorCode::InvalidArgument, "already handshaken", None)
                    .await?;
            }
            ClientFrame::Disconnect { reason } => {
                tracing::info!(%client_id, %reason, "client said goodbye");
                break LoopExit::Closed;
            }
        }
    };

    // --- Step 3: Teardown ---
    if let Some(Stream { cancel, task }) = stream {
        match exit {
            // The pump sees the flag itself and tells the client.
            LoopExit::Shutdown => {
                let _ = task.await;
                drop(cancel);
            }
            LoopExit::Closed => {
                drop(cancel);
                let _ = task.await;
            }
        }
    }
    let _ = socket.close().await;

    // _guard drops here → release fires.
    Ok(())
}

/// Receives the next frame. Without an open stream the socket must show
/// activity within `idle`; the outer `Err` means it did not.
async fn recv_with_idle(
    socket: &WebSocketConnection,
    idle: Duration,
    streaming: bool,
) -> Result<Result<Option<Vec<u8>>, tandem_transport::TransportError>, tokio::time::error::Elapsed>
{
    if streaming {
        Ok(socket.recv().await)
    } else {
        tokio::time::timeout(idle, socket.recv()).await
    }
}

/// Performs the initial handshake: receive Handshake, check, admit, ack.
async fn perform_handshake<V, C>(
    socket: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
) -> Result<ClientId, TandemError>
where
    V: ClientIdValidator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, socket.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("socket closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(TandemError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let frame: ClientFrame = match state.codec.decode(&data) {
        Ok(frame) => frame,
        Err(e) => {
            send_error(socket, &state.codec, ErrorCode::InvalidArgument, "expected Handshake", None).await?;
            return Err(e.into());
        }
    };

    let ClientFrame::Handshake { version, client_id } = frame else {
        send_error(socket, &state.codec, ErrorCode::InvalidArgument, "expected Handshake", None).await?;
        return Err(ProtocolError::InvalidMessage("first frame must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_error(socket, &state.codec, ErrorCode::InvalidArgument, &message, None).await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let client_id = match state.validator.validate(client_id.as_deref()).await {
        Ok(client_id) => client_id,
        Err(e) => {
            tracing::info!(conn_id = %socket.id(), error = %e, "client refused");
            send_error(socket, &state.codec, ErrorCode::Unauthenticated, &e.to_string(), None).await?;
            let _ = socket.close().await;
            return Err(e.into());
        }
    };

    state.service.admit(&client_id, socket.id().into_inner()).await;

    let ack = ServerFrame::HandshakeAck {
        client_id: client_id.clone(),
        server_time: state.uptime_ms(),
    };
    send_frame(socket, &state.codec, &ack).await?;
    Ok(client_id)
}

/// Runs one unary call and sends its reply.
///
/// The call runs on its own task. If the deadline passes the client gets
/// `DeadlineExceeded`, but the call still runs to completion, so its room
/// and membership updates are never torn in half.
async fn handle_request<V, C>(
    socket: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
    client_id: &ClientId,
    socket_id: u64,
    id: u64,
    call: Call,
) -> Result<(), TandemError>
where
    V: ClientIdValidator,
    C: Codec,
{
    let name = call.name();
    let task = {
        let state = Arc::clone(state);
        let client_id = client_id.clone();
        tokio::spawn(async move {
            let conn = state.service.connection(&client_id, socket_id).await;
            state.service.call(&conn, call).await
        })
    };

    match tokio::time::timeout(state.config.unary_deadline, task).await {
        Ok(Ok(reply)) => {
            tracing::debug!(%client_id, id, call = name, status = %reply.status, "call finished");
            send_frame(socket, &state.codec, &ServerFrame::Reply { id, reply }).await
        }
        Ok(Err(e)) => {
            tracing::error!(%client_id, id, call = name, error = %e, "call task failed");
            send_error(socket, &state.codec, ErrorCode::Unavailable, "call failed", Some(id)).await
        }
        Err(_) => {
            tracing::warn!(%client_id, id, call = name, "call missed its deadline");
            send_error(socket, &state.codec, ErrorCode::DeadlineExceeded, "deadline exceeded", Some(id))
                .await
        }
    }
}

/// Spawns the pump for this socket's event stream under `lease`.
///
/// Taking the lease revoked any stream another socket with the same client
/// id held; that socket is told with `Error { Unavailable }`.
fn open_stream<V, C>(
    socket: &Arc<WebSocketConnection>,
    state: &Arc<ServerState<V, C>>,
    conn: Arc<Connection>,
    mut lease: StreamLease,
    socket_id: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Stream
where
    V: ClientIdValidator,
    C: Codec + Clone,
{
    tracing::info!(client_id = %conn.client_id(), "event stream opened");

    let (cancel, cancelled) = oneshot::channel::<()>();
    let socket = Arc::clone(socket);
    let state = Arc::clone(state);
    let task = tokio::spawn(async move {
        let mut sink = SocketSink::new(Arc::clone(&socket), state.codec.clone());
        let cancelled = async {
            let _ = cancelled.await;
        };
        let exit = pump_events(&conn, &mut lease, &mut sink, cancelled, &mut shutdown).await;
        conn.close_stream(&lease);

        let client_id = conn.client_id();
        tracing::info!(%client_id, ?exit, "event stream closed");
        match exit {
            PumpExit::Shutdown => {
                let _ = send_error(
                    &socket,
                    &state.codec,
                    ErrorCode::Unavailable,
                    "server is shutting down",
                    None,
                )
                .await;
            }
            PumpExit::Superseded => {
                let _ = send_error(
                    &socket,
                    &state.codec,
                    ErrorCode::Unavailable,
                    "event stream taken over by another socket",
                    None,
                )
                .await;
            }
            PumpExit::SendFailed => {
                state.service.release(client_id, socket_id).await;
            }
            PumpExit::Cancelled => {}
        }
    });

    Stream { cancel, task }
}

async fn send_frame(
    socket: &WebSocketConnection,
    codec: &impl Codec,
    frame: &ServerFrame,
) -> Result<(), TandemError> {
    let bytes = codec.encode(frame)?;
    socket.send(&bytes).await?;
    Ok(())
}

/// Sends a `ServerFrame::Error` to the client.
async fn send_error(
    socket: &WebSocketConnection,
    codec: &impl Codec,
    code: ErrorCode,
    message: &str,
    id: Option<u64>,
) -> Result<(), TandemError> {
    let frame = ServerFrame::Error {
        code,
        message: message.to_string(),
        id,
    };
    send_frame(socket, codec, &frame).await
}
