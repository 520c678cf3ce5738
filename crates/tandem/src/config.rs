//! Server configuration.

use std::time::Duration;

use tandem_room::DEFAULT_CHANNEL_SIZE;
use tandem_session::DEFAULT_OUTBOX_CAPACITY;

/// Tunables for a [`TandemServer`](crate::TandemServer).
///
/// Every field has a usable default; the builder methods on
/// [`TandemServerBuilder`](crate::TandemServerBuilder) set them one at a
/// time.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Upper bound on a single unary call, measured on the server.
    pub unary_deadline: Duration,
    /// How long a new socket may take to send its handshake.
    pub handshake_timeout: Duration,
    /// Events buffered per connection before the oldest is dropped.
    pub outbox_capacity: usize,
    /// Commands queued per room actor.
    pub room_channel_size: usize,
    /// A connection with no stream and no calls for this long is reaped.
    pub idle_timeout: Duration,
    /// How often the reaper looks for idle connections.
    pub reap_interval: Duration,
    /// How long shutdown waits for connection tasks to finish.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7700".to_string(),
            unary_deadline: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            room_channel_size: DEFAULT_CHANNEL_SIZE,
            idle_timeout: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
        }
    }
}
