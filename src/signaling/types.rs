use std::fmt;

use rand::Rng;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Protocol rejections reported to the originating connection via
/// `operationFailed`. The `Display` text is the wire-level reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid arguments")]
    InvalidArguments,

    #[error("wrong password")]
    WrongPassword,

    #[error("line busy")]
    LineBusy,

    #[error("no peer")]
    NoPeer,
}

/// Room names and passwords are capped at this many characters.
pub const MAX_FIELD_LEN: usize = 30;

const CONN_ID_LEN: usize = 13;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Connection ID: 13-byte fixed array ("conn_" + 8 hex), assigned by the
/// server when a connection is accepted. Stable for the connection's
/// lifetime and never exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    bytes: [u8; CONN_ID_LEN],
    len: u8,
}

impl ConnId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        let mut rng = rand::rng();
        let value: u32 = rng.random();

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONN_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        let src = s.as_bytes();
        let len = src.len().min(CONN_ID_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

/// Room name chosen by the creating client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// Accepts any string of at most [`MAX_FIELD_LEN`] characters.
    pub fn new(s: &str) -> Option<Self> {
        (s.chars().count() <= MAX_FIELD_LEN).then(|| Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room password, same length cap as the name. Compared exactly; `Debug`
/// omits the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(s: &str) -> Option<Self> {
        (s.chars().count() <= MAX_FIELD_LEN).then(|| Self(s.to_owned()))
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

/// A pairing slot between the creating callee and a later caller.
#[derive(Debug)]
pub(crate) struct Room {
    pub password: Password,
    /// The connection that created the room. Set once, never reassigned.
    pub callee: ConnId,
    /// The connection that joined afterwards; absent until paired.
    pub caller: Option<ConnId>,
}

impl Room {
    pub fn new(password: Password, callee: ConnId) -> Self {
        Self {
            password,
            callee,
            caller: None,
        }
    }

    /// The other occupant, if `conn` occupies this room and a peer exists.
    /// A connection matching neither slot resolves to `None`.
    pub fn peer_of(&self, conn: ConnId) -> Option<ConnId> {
        if conn == self.callee {
            self.caller
        } else if self.caller == Some(conn) {
            Some(self.callee)
        } else {
            None
        }
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Frames pushed from the session actor to a connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Event(OutboundMessage),
    /// Tear the connection down; the task closes the socket and reports its
    /// own disconnect.
    Close,
}
