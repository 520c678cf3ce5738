//! Client side of Tandem.
//!
//! - [`Mirror`]: the optimistic copy of the room lifecycle, with
//!   speculative actions that roll back when the server disagrees
//! - [`TandemClient`]: a WebSocket client that drives the mirror from its
//!   own calls and from pushed room events
//!
//! Front ends render [`TandemClient::state`] and
//! [`TandemClient::connectivity`] and re-render from the callback given to
//! [`TandemClient::subscribe`].

mod client;
mod config;
mod error;
mod mirror;

pub use client::TandemClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use mirror::{Connectivity, LocalEvent, Mirror, MirrorError, MirrorState, Speculation};
