//! Wire protocol for Tandem.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Identifiers** ([`ClientId`], [`RoomId`]) and the code generator
//!   behind them.
//! - **Frames** ([`ClientFrame`], [`ServerFrame`]) carrying calls, replies,
//!   and pushed [`ServerEvent`]s.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) turning frames into bytes.
//!
//! It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Session / Room
//! ```

mod codec;
mod error;
mod ids;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use ids::{
    CLIENT_CODE_ALPHABET, CLIENT_CODE_LEN, ClientId, MAX_CLIENT_ID_LEN,
    ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomId, generate_code,
};
pub use types::{
    Call, ClientFrame, ErrorCode, EventKind, PROTOCOL_VERSION, Reply,
    ResponseStatus, RoomKind, Roster, ServerEvent, ServerFrame, SessionBlob,
};
