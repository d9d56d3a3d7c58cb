//! Wire protocol: JSON frames of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JOIN: &str = "join";
pub const CHAT_MESSAGE: &str = "chat message";
pub const TYPING: &str = "typing";
pub const STOP_TYPING: &str = "stop typing";
pub const USER_JOINED: &str = "user joined";
pub const USER_LEFT: &str = "user left";
pub const USER_LIST: &str = "user list";

/// A raw frame as received from a client.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    pub data: Option<Value>,
}

/// A frame ready to be serialized to clients.
#[derive(Debug, Serialize)]
pub struct OutboundFrame {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid payload for '{event}': {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

impl ProtocolError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::UnknownEvent(_) => "unknown_event",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

/// Every event the dispatcher reacts to. `Connect` and `Disconnect` come from
/// the transport itself and are never parsed off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Connect,
    Join { name: String },
    ChatMessage { message: String },
    /// The client announces its own name; `None` when the frame carried none.
    Typing { name: Option<String> },
    StopTyping,
    Disconnect,
}

impl InboundEvent {
    /// Parse a text frame from a client.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: InboundFrame) -> Result<Self, ProtocolError> {
        match frame.event.as_str() {
            JOIN => {
                let name = require_string(JOIN, frame.data)?;
                Ok(Self::Join { name })
            }
            CHAT_MESSAGE => {
                let message = frame
                    .data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::InvalidPayload {
                        event: CHAT_MESSAGE,
                        reason: "expected { message: string }".into(),
                    })?;
                Ok(Self::ChatMessage {
                    message: message.to_owned(),
                })
            }
            TYPING => {
                let name = match frame.data {
                    None | Some(Value::Null) => None,
                    data => Some(require_string(TYPING, data)?),
                };
                Ok(Self::Typing { name })
            }
            STOP_TYPING => Ok(Self::StopTyping),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }

    /// Wire name, or a transport marker for `Connect`/`Disconnect`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Join { .. } => JOIN,
            Self::ChatMessage { .. } => CHAT_MESSAGE,
            Self::Typing { .. } => TYPING,
            Self::StopTyping => STOP_TYPING,
            Self::Disconnect => "disconnect",
        }
    }
}

fn require_string(event: &'static str, data: Option<Value>) -> Result<String, ProtocolError> {
    match data {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ProtocolError::InvalidPayload {
            event,
            reason: "expected a string".into(),
        }),
    }
}

/// A chat message as relayed to every connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundEvent {
    ChatMessage(ChatMessage),
    UserJoined(String),
    UserLeft(String),
    UserList(Vec<String>),
    Typing(String),
    StopTyping,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatMessage(_) => CHAT_MESSAGE,
            Self::UserJoined(_) => USER_JOINED,
            Self::UserLeft(_) => USER_LEFT,
            Self::UserList(_) => USER_LIST,
            Self::Typing(_) => TYPING,
            Self::StopTyping => STOP_TYPING,
        }
    }

    pub fn to_frame(&self) -> Result<OutboundFrame, serde_json::Error> {
        let data = match self {
            Self::ChatMessage(msg) => Some(serde_json::to_value(msg)?),
            Self::UserJoined(name) | Self::UserLeft(name) | Self::Typing(name) => {
                Some(Value::String(name.clone()))
            }
            Self::UserList(names) => Some(Value::Array(
                names.iter().cloned().map(Value::String).collect(),
            )),
            Self::StopTyping => None,
        };
        Ok(OutboundFrame {
            event: self.name(),
            data,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_frame()?)
    }
}
