//! # Tandem
//!
//! Room orchestration server for small turn-based sessions.
//!
//! Clients create a room, share its six-letter code, wait for the others
//! to join and declare readiness, and get a pushed `GameStarted` when
//! everyone is in. If a member drops mid-session the room enters recovery
//! instead of silently resetting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # async fn run() -> Result<(), TandemError> {
//! let server = TandemServer::builder()
//!     .bind("0.0.0.0:7700")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! Server (this crate)   ← RoomService, socket handler, event pump
//!     ↕
//! Room                  ← lifecycle state machine, room actors
//!     ↕
//! Session               ← connection registry, outboxes, admission
//!     ↕
//! Protocol / Transport  ← frames, codecs, WebSocket
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod server;
mod service;

pub use config::ServerConfig;
pub use dispatch::{EventSink, PumpExit, SocketSink, pump_events};
pub use error::TandemError;
pub use server::{ShutdownHandle, TandemServer, TandemServerBuilder};
pub use service::RoomService;

pub mod prelude {
    pub use crate::{ServerConfig, ShutdownHandle, TandemError, TandemServer, TandemServerBuilder};
    pub use tandem_protocol::{
        Call, ClientFrame, ClientId, ErrorCode, EventKind, PROTOCOL_VERSION, Reply,
        ResponseStatus, RoomId, RoomKind, Roster, ServerEvent, ServerFrame, SessionBlob,
    };
    pub use tandem_session::{ClientIdValidator, HeaderValidator, SessionError};
}
