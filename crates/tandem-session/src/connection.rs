//! The server's record of one connected participant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use tandem_protocol::{ClientId, RoomId, ServerEvent};
use tokio::sync::{Mutex, MutexGuard, oneshot};

use crate::{Outbox, PushOutcome};

/// One participant, keyed by [`ClientId`] in the
/// [`ConnectionRegistry`](crate::ConnectionRegistry).
///
/// ## Membership lock
///
/// The room slot sits behind an async mutex that every unary call holds
/// for its whole duration. That serializes one client's calls against each
/// other, so "check membership, talk to the room, update membership" is
/// atomic per client. The lock order is always connection first, then
/// room actor; actors never touch connections.
///
/// ## Owner and stream
///
/// Several sockets may present the same client id. The owner is the one
/// that handshook last; only the owner's departure removes the
/// connection. The outbox has one reader at a time, the holder of the
/// current [`StreamLease`]. Opening a stream revokes the previous lease.
#[derive(Debug)]
pub struct Connection {
    client_id: ClientId,
    room: Mutex<Option<RoomId>>,
    outbox: Outbox,
    created: Instant,
    /// Milliseconds after `created` of the last call.
    last_seen_ms: AtomicU64,
    owner: AtomicU64,
    stream: std::sync::Mutex<Option<(u64, oneshot::Sender<()>)>>,
    next_lease: AtomicU64,
}

/// The right to drain a connection's outbox.
///
/// Revoked when a later [`Connection::open_stream`] takes the stream over.
#[derive(Debug)]
pub struct StreamLease {
    id: u64,
    revoked: oneshot::Receiver<()>,
    done: bool,
}

impl StreamLease {
    /// Completes once the lease is revoked.
    pub async fn revoked(&mut self) {
        if !self.done {
            let _ = (&mut self.revoked).await;
            self.done = true;
        }
    }
}

impl Connection {
    pub fn new(client_id: ClientId, outbox_capacity: usize) -> Self {
        Self {
            client_id,
            room: Mutex::new(None),
            outbox: Outbox::new(outbox_capacity),
            created: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            owner: AtomicU64::new(0),
            stream: std::sync::Mutex::new(None),
            next_lease: AtomicU64::new(1),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Locks the membership slot. Hold the guard for the whole call.
    pub async fn membership(&self) -> MutexGuard<'_, Option<RoomId>> {
        self.room.lock().await
    }

    /// The room this client is in, waiting for any in-flight call first.
    pub async fn current_room(&self) -> Option<RoomId> {
        self.room.lock().await.clone()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Queues an event for this client's stream.
    pub fn deliver(&self, event: ServerEvent) -> PushOutcome {
        let kind = event.kind;
        let outcome = self.outbox.push(event);
        match outcome {
            PushOutcome::Queued => {}
            PushOutcome::DroppedOldest => tracing::warn!(
                client_id = %self.client_id,
                %kind,
                capacity = self.outbox.capacity(),
                "outbox full, dropped oldest event"
            ),
            PushOutcome::Closed => tracing::debug!(
                client_id = %self.client_id,
                %kind,
                "outbox closed, event discarded"
            ),
        }
        outcome
    }

    /// Records activity now.
    pub fn touch(&self) {
        let now = elapsed_ms(self.created);
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    /// Time since the last call.
    pub fn idle_for(&self) -> Duration {
        let now = elapsed_ms(self.created);
        let last = self.last_seen_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// The socket that handshook last, `0` if none has claimed it.
    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    pub fn set_owner(&self, owner: u64) {
        self.owner.store(owner, Ordering::Release);
    }

    /// Opens the event stream, revoking any lease handed out before.
    pub fn open_stream(&self) -> StreamLease {
        let id = self.next_lease.fetch_add(1, Ordering::Relaxed);
        let (tx, revoked) = oneshot::channel();
        let previous = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((id, tx));
        if let Some((previous, _)) = previous {
            tracing::info!(client_id = %self.client_id, previous, lease = id, "event stream taken over");
        }
        StreamLease {
            id,
            revoked,
            done: false,
        }
    }

    /// Releases `lease`. A no-op if it was already revoked.
    pub fn close_stream(&self, lease: &StreamLease) {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if stream.as_ref().is_some_and(|(id, _)| *id == lease.id) {
            *stream = None;
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
