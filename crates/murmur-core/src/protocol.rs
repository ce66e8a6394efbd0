//! Wire protocol: one JSON object per WebSocket text frame, discriminated by
//! its `type` field.
//!
//! | Direction | type | Fields |
//! |-----------|------|--------|
//! | S→C | `hello` | `message` |
//! | C→S | `user_message` | `text` |
//! | S→C | `typing` | `value` |
//! | S→C | `start` | `role` |
//! | S→C | `delta` | `delta` |
//! | S→C | `end` | |
//! | S→C | `error` | `message` |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Greeting sent on every accepted connection.
pub const HELLO_MESSAGE: &str = "WebSocket connection established";

/// Error message reported when a response cycle is abandoned mid-stream.
pub const STREAMING_FAILED: &str = "Streaming failed";

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human at the client.
    User,
    /// The (mock) assistant on the server.
    Assistant,
}

/// Events sent from the server to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection accepted.
    Hello {
        /// Human-readable greeting.
        message: String,
    },
    /// Assistant busy indicator.
    Typing {
        /// `true` while a reply is being produced.
        value: bool,
    },
    /// A new assistant message begins.
    Start {
        /// Always [`Role::Assistant`] in practice.
        role: Role,
    },
    /// Fragment to append to the current assistant message.
    Delta {
        /// The fragment text.
        delta: String,
    },
    /// The current assistant message is complete.
    End,
    /// Malformed or unsupported input, or a mid-stream failure.
    Error {
        /// Error description.
        message: String,
    },
}

impl ServerEvent {
    /// The greeting sent when a connection opens.
    pub fn hello() -> Self {
        Self::Hello {
            message: HELLO_MESSAGE.into(),
        }
    }

    /// Build an error event from anything displayable.
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// Wire `type` discriminator of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Typing { .. } => "typing",
            Self::Start { .. } => "start",
            Self::Delta { .. } => "delta",
            Self::End => "end",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON text frame received from the server.
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Events sent from the client to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The user submitted input.
    UserMessage {
        /// Submitted text, already trimmed by the client.
        text: String,
    },
}

impl ClientEvent {
    /// Serialize to a JSON text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A validated inbound client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A `user_message`. The text is trimmed and may be empty.
    UserMessage {
        /// Trimmed user text.
        text: String,
    },
}

/// Reasons an inbound frame is rejected. `Display` is the exact message
/// reported back to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("Invalid JSON")]
    InvalidJson,
    /// Valid JSON, but not an event type the server handles.
    #[error("Unknown message type")]
    UnknownType,
}

/// Validate a raw client frame.
///
/// Anything that parses as JSON but is not an object with
/// `"type": "user_message"` is an unknown type. The `text` field is coerced
/// to a string (absent or `null` becomes empty) and trimmed.
pub fn parse_inbound(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;

    let Value::Object(map) = value else {
        return Err(ProtocolError::UnknownType);
    };

    match map.get("type").and_then(Value::as_str) {
        Some("user_message") => {
            let text = coerce_text(map.get("text"));
            Ok(Inbound::UserMessage {
                text: text.trim().to_owned(),
            })
        }
        _ => Err(ProtocolError::UnknownType),
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
