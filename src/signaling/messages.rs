use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Password, ProtocolError, RoomName};

/// Events received from clients, framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Create-or-join a room. The payload is validated field by field, so it
    /// is carried as raw JSON rather than a typed struct.
    #[serde(rename = "join")]
    Join(Value),

    /// Relay a session description to the paired peer.
    #[serde(rename = "sendSessionDescription")]
    SendSessionDescription(Value),

    /// Relay a connectivity candidate to the paired peer.
    #[serde(rename = "sendIceCandidate")]
    SendIceCandidate(Value),
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// The join request created a new room; the sender waits as callee.
    #[serde(rename = "roomCreated")]
    RoomCreated,

    /// The join request paired the sender into an existing room.
    #[serde(rename = "roomJoined")]
    RoomJoined,

    /// Join or relay rejected; the payload is the reason string.
    #[serde(rename = "operationFailed")]
    OperationFailed(String),

    /// A session description from the peer, unchanged.
    #[serde(rename = "sessionDescription")]
    SessionDescription(Value),

    /// A connectivity candidate from the peer, unchanged.
    #[serde(rename = "iceCandidate")]
    IceCandidate(Value),
}

impl ServerEvent {
    pub(crate) fn failure(err: ProtocolError) -> Self {
        Self::OperationFailed(err.to_string())
    }
}

/// Validate a `join` payload into its room name and password.
///
/// The payload must be an object whose `roomName` and `password` are both
/// strings within the length cap; anything else, including a non-object
/// payload, is `InvalidArguments`.
pub(crate) fn join_args(args: &Value) -> Result<(RoomName, Password), ProtocolError> {
    let name = args
        .get("roomName")
        .and_then(Value::as_str)
        .and_then(RoomName::new);
    let password = args
        .get("password")
        .and_then(Value::as_str)
        .and_then(Password::new);
    match (name, password) {
        (Some(name), Some(password)) => Ok((name, password)),
        _ => Err(ProtocolError::InvalidArguments),
    }
}
