//! The streaming bridge: drains a connection's outbox onto its socket.
//!
//! One pump runs per open subscription. Room actors never wait on it; they
//! push into the [`Outbox`](tandem_session::Outbox) and move on, and the
//! pump forwards events in order, numbering them per stream.

use std::future::Future;
use std::sync::Arc;

use tandem_protocol::{Codec, ServerEvent, ServerFrame};
use tandem_session::{Connection, StreamLease};
use tandem_transport::{Connection as _, WebSocketConnection};
use tokio::sync::watch;

use crate::TandemError;
use crate::server::stop_requested;

/// Where a pump delivers events.
pub trait EventSink: Send {
    /// Sends one event, already numbered.
    fn send(
        &mut self,
        seq: u64,
        event: ServerEvent,
    ) -> impl Future<Output = Result<(), TandemError>> + Send;
}

/// An [`EventSink`] writing `ServerFrame::Event` frames to a WebSocket.
pub struct SocketSink<C: Codec> {
    socket: Arc<WebSocketConnection>,
    codec: C,
}

impl<C: Codec> SocketSink<C> {
    pub fn new(socket: Arc<WebSocketConnection>, codec: C) -> Self {
        Self { socket, codec }
    }
}

impl<C: Codec> EventSink for SocketSink<C> {
    async fn send(&mut self, seq: u64, event: ServerEvent) -> Result<(), TandemError> {
        let bytes = self.codec.encode(&ServerFrame::Event { seq, event })?;
        self.socket.send(&bytes).await?;
        Ok(())
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The sink refused an event. The client should be disconnected.
    SendFailed,
    /// The socket went away, or the connection was removed and its outbox
    /// closed.
    Cancelled,
    /// The server is shutting down.
    Shutdown,
    /// Another socket with the same client id opened a stream.
    Superseded,
}

/// Forwards `conn`'s events to `sink` while `lease` holds the stream.
///
/// Termination signals win over pending events, so a closing socket is
/// never fed another frame. Sequence numbers start at 1 for each call.
pub async fn pump_events<S: EventSink>(
    conn: &Connection,
    lease: &mut StreamLease,
    sink: &mut S,
    cancelled: impl Future<Output = ()>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    tokio::pin!(cancelled);
    let client_id = conn.client_id();
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = &mut cancelled => return PumpExit::Cancelled,
            () = stop_requested(shutdown) => return PumpExit::Shutdown,
            () = lease.revoked() => return PumpExit::Superseded,
            next = conn.outbox().next() => {
                let Some(event) = next else {
                    tracing::debug!(%client_id, "outbox closed, stream ends");
                    return PumpExit::Cancelled;
                };
                seq += 1;
                let kind = event.kind;
                if let Err(e) = sink.send(seq, event).await {
                    tracing::debug!(%client_id, seq, error = %e, "event send failed");
                    return PumpExit::SendFailed;
                }
                tracing::debug!(%client_id, seq, %kind, "event delivered");
            }
        }
    }
}
