//! Connection registry for Tandem.
//!
//! This crate tracks who is connected:
//!
//! 1. **Admission**: validating the id a client presents
//!    ([`ClientIdValidator`], [`HeaderValidator`])
//! 2. **Registry**: one [`Connection`] per client id
//!    ([`ConnectionRegistry`])
//! 3. **Outbound queue**: a bounded drop-oldest [`Outbox`] per connection
//!    that room actors push events into
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)   ← resolves the caller's Connection on every call
//!     ↕
//! Session (this crate)
//!     ↕
//! Protocol (below) ← provides ClientId, RoomId, ServerEvent
//! ```

mod connection;
mod error;
mod outbox;
mod registry;
mod validator;

pub use connection::{Connection, StreamLease};
pub use error::SessionError;
pub use outbox::{DEFAULT_OUTBOX_CAPACITY, Outbox, PushOutcome};
pub use registry::ConnectionRegistry;
pub use validator::{ClientIdValidator, HeaderValidator};
