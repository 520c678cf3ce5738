//! `TandemServer` builder and server loop.
//!
//! This is the entry point for running a Tandem server. It ties together
//! all the layers: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tandem_protocol::{Codec, JsonCodec};
use tandem_session::{ClientIdValidator, HeaderValidator};
use tandem_transport::{Incoming, PendingWebSocket, Transport, WebSocketTransport};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::handler::handle_connection;
use crate::{RoomService, ServerConfig, TandemError};

/// Shared server state passed to each socket handler task.
pub(crate) struct ServerState<V: ClientIdValidator, C: Codec> {
    pub(crate) service: Arc<RoomService>,
    pub(crate) validator: V,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    started: Instant,
}

impl<V: ClientIdValidator, C: Codec> ServerState<V, C> {
    /// Milliseconds since the server started. Sent in the handshake ack.
    pub(crate) fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting a Tandem server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tandem::prelude::*;
///
/// # async fn run() -> Result<(), TandemError> {
/// let server = TandemServer::builder()
///     .bind("0.0.0.0:7700")
///     .unary_deadline(Duration::from_millis(500))
///     .build()
///     .await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TandemServerBuilder {
    config: ServerConfig,
}

impl TandemServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn unary_deadline(mut self, deadline: Duration) -> Self {
        self.config.unary_deadline = deadline;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.config.outbox_capacity = capacity;
        self
    }

    pub fn room_channel_size(mut self, size: usize) -> Self {
        self.config.room_channel_size = size;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.config.reap_interval = interval;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Binds the listener with the default [`HeaderValidator`].
    pub async fn build(self) -> Result<TandemServer<HeaderValidator, JsonCodec>, TandemError> {
        self.build_with(HeaderValidator).await
    }

    /// Binds the listener, admitting clients through `validator`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build_with<V: ClientIdValidator>(
        self,
        validator: V,
    ) -> Result<TandemServer<V, JsonCodec>, TandemError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let (shutdown, _) = watch::channel(false);

        let state = Arc::new(ServerState {
            service: Arc::new(RoomService::new(
                self.config.outbox_capacity,
                self.config.room_channel_size,
            )),
            validator,
            codec: JsonCodec,
            config: self.config,
            started: Instant::now(),
        });

        Ok(TandemServer {
            transport,
            state,
            shutdown: Arc::new(shutdown),
        })
    }
}

/// Triggers graceful shutdown of a running server from anywhere.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }
}

/// A bound Tandem server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct TandemServer<V: ClientIdValidator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V, C>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl TandemServer<HeaderValidator, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> TandemServerBuilder {
        TandemServerBuilder::new()
    }
}

impl<V, C> TandemServer<V, C>
where
    V: ClientIdValidator,
    C: Codec + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room service behind this server, for embedding and inspection.
    pub fn service(&self) -> Arc<RoomService> {
        Arc::clone(&self.state.service)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }

    /// Runs until a [`ShutdownHandle`] fires.
    pub async fn run(self) -> Result<(), TandemError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` resolves or a
    /// [`ShutdownHandle`] fires, then shuts down gracefully.
    ///
    /// Shutdown stops accepting, lets every socket task finish its
    /// in-flight call (open streams get `Error { Unavailable }`), waits up
    /// to `drain_timeout` for them, and finally stops every room.
    pub async fn run_until(
        mut self,
        signal: impl Future<Output = ()>,
    ) -> Result<(), TandemError> {
        let addr = self.local_addr().ok();
        tracing::info!(?addr, "Tandem server running");

        tokio::pin!(signal);
        let mut stopping = self.shutdown.subscribe();
        let reaper = tokio::spawn(reap_idle(Arc::clone(&self.state), self.shutdown.subscribe()));
        let mut sockets = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = &mut signal => break,
                () = stop_requested(&mut stopping) => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        let shutdown = self.shutdown.subscribe();
                        sockets.spawn(serve_socket(incoming, state, shutdown));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
            // Reap finished socket tasks so the set does not grow.
            while sockets.try_join_next().is_some() {}
        }

        self.shutdown.send_replace(true);
        tracing::info!(sockets = sockets.len(), "shutting down, draining sockets");

        let drain_timeout = self.state.config.drain_timeout;
        let drained = tokio::time::timeout(drain_timeout, async {
            while sockets.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = sockets.len(), "drain timed out, aborting sockets");
            sockets.shutdown().await;
        }

        let _ = reaper.await;
        self.state.service.rooms().shutdown_all().await;
        tracing::info!("Tandem server stopped");
        Ok(())
    }
}

/// Upgrades an accepted peer within `handshake_timeout`, then runs its
/// handler. Runs on the socket's own task so a slow peer stalls only itself.
async fn serve_socket<V, C>(
    incoming: PendingWebSocket,
    state: Arc<ServerState<V, C>>,
    shutdown: watch::Receiver<bool>,
) where
    V: ClientIdValidator,
    C: Codec + Clone,
{
    let peer = incoming.peer_addr();
    let socket = match tokio::time::timeout(state.config.handshake_timeout, incoming.upgrade()).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(e)) => {
            tracing::debug!(%peer, error = %e, "upgrade failed");
            return;
        }
        Err(_) => {
            tracing::debug!(%peer, "upgrade timed out");
            return;
        }
    };
    if let Err(e) = handle_connection(socket, state, shutdown).await {
        tracing::debug!(%peer, error = %e, "socket ended with error");
    }
}

/// Disconnects connections that have been idle too long, every
/// `reap_interval`, until shutdown.
async fn reap_idle<V: ClientIdValidator, C: Codec>(
    state: Arc<ServerState<V, C>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(state.config.reap_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = stop_requested(&mut shutdown) => break,
            _ = ticker.tick() => {
                let idle = state.service.connections().idle(state.config.idle_timeout).await;
                for client_id in idle {
                    tracing::info!(%client_id, "reaping idle connection");
                    state.service.disconnect(&client_id).await;
                }
            }
        }
    }
}

/// Completes once shutdown is flagged or the flag's sender is gone.
///
/// The `watch::Ref` is dropped before this returns, which keeps `select!`
/// arms built on it `Send`.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
