//! JSON wire protocol between canvas clients and the relay.
//!
//! Every WebSocket text frame carries exactly one message, a JSON object
//! tagged by its `type` field:
//! ```text
//! client ─► relay   {"type":"join_room","room_id":"abc","display_name":"Alice"}
//! relay  ─► client  {"type":"client_joined","room_id":"abc","participant":{…},"participants":[…]}
//! client ─► relay   {"type":"send_operation","room_id":"abc","operation":{"type":"start_stroke",…}}
//! relay  ─► peers   {"type":"receive_operation","room_id":"abc","operation":{…}}
//! ```
//!
//! The relay never looks inside `operation` or `snapshot`; they pass
//! through as opaque payloads.

use std::fmt;

use doodle_canvas::{CanvasSnapshot, Operation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Relay-assigned identity of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A connection's membership in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub connection: ConnectionId,
    pub display_name: String,
}

impl Participant {
    pub fn new(connection: ConnectionId, display_name: impl Into<String>) -> Self {
        Self {
            connection,
            display_name: display_name.into(),
        }
    }
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
        display_name: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SendOperation {
        room_id: String,
        operation: Operation,
    },
    /// Host's answer to a `request_canvas_state`.
    SendCanvasStateToClient {
        target: ConnectionId,
        snapshot: CanvasSnapshot,
    },
    Ping,
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome {
        connection: ConnectionId,
    },
    /// Membership changed; `participants[0]` is the host.
    ClientJoined {
        room_id: String,
        participant: Participant,
        participants: Vec<Participant>,
    },
    ClientLeft {
        room_id: String,
        participant: Participant,
        participants: Vec<Participant>,
    },
    ReceiveOperation {
        room_id: String,
        operation: Operation,
    },
    /// Sent to the host when `requester` joins a room that already has members.
    RequestCanvasState {
        room_id: String,
        requester: ConnectionId,
    },
    ReceiveCanvasState {
        snapshot: CanvasSnapshot,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

/// Errors that map to a stable machine-readable code on the wire.
pub trait ErrorCode: fmt::Display {
    fn error_code(&self) -> &'static str;
}

impl ServerMessage {
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode(text)
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode(text)
    }

    /// Wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::ClientJoined { .. } => "client_joined",
            ServerMessage::ClientLeft { .. } => "client_left",
            ServerMessage::ReceiveOperation { .. } => "receive_operation",
            ServerMessage::RequestCanvasState { .. } => "request_canvas_state",
            ServerMessage::ReceiveCanvasState { .. } => "receive_canvas_state",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong => "pong",
        }
    }
}
