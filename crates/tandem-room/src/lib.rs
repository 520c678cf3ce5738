//! Room lifecycle management for Tandem.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! members, their readiness, its lifecycle state, and the session payload.
//!
//! # Key types
//!
//! - [`transition`]: the lifecycle as a pure function over a [`RoomView`]
//! - [`RoomState`] and [`derive`]: the authoritative state and the rule it
//!   must always agree with
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomRegistry`]: creates, looks up, and collects rooms

mod error;
mod lifecycle;
mod payload;
mod registry;
mod room;
mod state;

pub use error::RoomError;
pub use lifecycle::{
    Change, Effect, Recipients, Rejection, RoomEvent, RoomView, Seat, Transition, transition,
};
pub use payload::SessionPayload;
pub use registry::{DEFAULT_CHANNEL_SIZE, RoomRegistry};
pub use room::{RoomHandle, RoomInfo};
pub use state::{RoomState, derive};
