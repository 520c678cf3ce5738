//! Error types for the client.

use tandem_protocol::{ErrorCode, ProtocolError, ResponseStatus};
use tandem_transport::TransportError;

use crate::MirrorError;

/// Errors returned by [`TandemClient`](crate::TandemClient) operations.
///
/// Every error from a speculative operation means the mirror has already
/// been rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The mirror refused the action before anything was sent.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// The server answered with a status other than OK.
    #[error("server answered {0}")]
    Status(ResponseStatus),

    /// The server sent an error frame.
    #[error("server error {code:?}: {message}")]
    Server { code: ErrorCode, message: String },

    /// No reply arrived within the request timeout.
    #[error("{call} timed out")]
    Timeout { call: &'static str },

    /// The socket closed while the call was pending.
    #[error("disconnected from server")]
    Disconnected,
}

impl ClientError {
    /// The status the server returned, if this is a status error.
    pub fn status(&self) -> Option<ResponseStatus> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}
