//! Error types for the room layer.

use tandem_protocol::RoomId;

use crate::Rejection;

/// Errors returned by [`RoomHandle`](crate::RoomHandle) calls.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The lifecycle guard refused the operation. Nothing was committed.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The room's actor has stopped (collected or shut down).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
