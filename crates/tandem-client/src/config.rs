//! Client configuration.

use std::time::Duration;

use tandem_protocol::ClientId;

/// Default per-call timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time allowed for the handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`TandemClient`](crate::TandemClient).
///
/// Only the server URL is required; the client id defaults to a fresh
/// five-letter code.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tandem_client::ClientConfig;
///
/// let config = ClientConfig::new("ws://127.0.0.1:7700")
///     .with_request_timeout(Duration::from_millis(500));
/// assert_eq!(config.client_id.as_str().len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub url: String,
    /// Identity presented in the handshake.
    pub client_id: ClientId,
    /// How long a call waits for its reply.
    pub request_timeout: Duration,
    /// How long the handshake may take.
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: ClientId::generate(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
