//! Unified error type for the Tandem server.

use tandem_protocol::ProtocolError;
use tandem_room::RoomError;
use tandem_session::SessionError;
use tandem_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// Expected outcomes of a call (unknown room, room full, ...) never show up
/// here; they travel as a `ResponseStatus` on the reply. A `TandemError`
/// means a socket or its handshake went wrong.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded, or arrived out of place.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client was refused at the handshake.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room actor could not be reached.
    #[error(transparent)]
    Room(#[from] RoomError),
}
