//! Identifier newtypes and the code generator behind them.
//!
//! Both identifiers are short human-typeable codes rather than UUIDs: room
//! codes are read aloud between players, client codes show up in logs.

use std::fmt;
use std::str::FromStr;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Alphabet for room codes. `0/O` and `1/I` are left out so a code read
/// off a screen can't be mistyped.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Alphabet for generated client codes.
pub const CLIENT_CODE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a generated client code.
pub const CLIENT_CODE_LEN: usize = 5;

/// Longest client identifier the server accepts.
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Generates a random code of `len` characters drawn from `alphabet`.
///
/// The alphabet must be ASCII. An empty alphabet yields an empty string.
pub fn generate_code(len: usize, alphabet: &str) -> String {
    let symbols = alphabet.as_bytes();
    let mut rng = rand::rng();
    (0..len)
        .filter_map(|_| symbols.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// Identifies one participant across calls and the event stream.
///
/// The client picks its own id and presents it in the handshake; the
/// server only checks the shape. Valid ids are 1-64 characters from
/// `[A-Za-z0-9_-]`, which deserialization enforces through
/// `#[serde(try_from = "String")]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Validates `raw` as a client id.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidClientId`] if `raw` is empty, longer
    /// than [`MAX_CLIENT_ID_LEN`], or contains other characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let well_formed = !raw.is_empty()
            && raw.len() <= MAX_CLIENT_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(ProtocolError::InvalidClientId(raw.to_string()))
        }
    }

    /// Generates a fresh 5-letter uppercase id.
    pub fn generate() -> Self {
        Self(generate_code(CLIENT_CODE_LEN, CLIENT_CODE_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClientId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// A room's shareable code, e.g. `"K7QX2M"`.
///
/// Codes typed by users are normalized (trimmed, uppercased) on the way
/// in, so `" k7qx2m "` and `"K7QX2M"` name the same room. Normalization
/// never fails: a code that doesn't match any room is simply not found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Normalizes user input into a room code.
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Generates a fresh code. Uniqueness is the room registry's job.
    pub fn generate() -> Self {
        Self(generate_code(ROOM_CODE_LEN, ROOM_CODE_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for RoomId {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}
