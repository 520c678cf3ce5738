//! Error types for the session layer.

/// Errors raised while admitting a client.
///
/// These map to `ErrorCode::Unauthenticated` on the wire: the socket is
/// told why and closed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The handshake carried no client id.
    #[error("missing client id")]
    MissingClientId,

    /// The client id is empty, too long, or uses characters outside
    /// `[A-Za-z0-9_-]`.
    #[error("invalid client id {0:?}")]
    InvalidClientId(String),

    /// A custom [`ClientIdValidator`](crate::ClientIdValidator) refused the
    /// client.
    #[error("client rejected: {0}")]
    Rejected(String),
}
