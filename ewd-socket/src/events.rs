//! Message model and message-type classification.
//!
//! Every frame exchanged with the EWD.js back end is a JSON object with a
//! `type` string; everything else is payload. `Message` keeps the type
//! separate from the payload fields so routing never has to dig through a
//! raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ewd_core::constants::{fields, message_types};
use ewd_core::error::{EwdError, EwdResult};

/// A message travelling over the socket or the degraded channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The dispatch key (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: String,
    /// All remaining fields of the object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    /// Create a message with no payload fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Parse an inbound frame. The frame must be an object with a string `type`.
    pub fn parse(raw: &str) -> EwdResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| EwdError::Serialization(format!("inbound message parse error: {e}")))
    }

    /// Build a message from an arbitrary JSON value.
    pub fn from_value(value: Value) -> EwdResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| EwdError::Serialization(format!("not a message object: {e}")))
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field. Writing `type` with a string changes the message kind.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == fields::TYPE {
            if let Value::String(kind) = value {
                self.kind = kind;
            }
            return;
        }
        self.fields.insert(key, value);
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Get a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// The `error` field, when it holds a truthy value.
    pub fn error(&self) -> Option<String> {
        match self.fields.get(fields::ERROR)? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The session token, if present.
    pub fn token(&self) -> Option<&str> {
        self.str_field(fields::TOKEN).filter(|t| !t.is_empty())
    }

    /// Title for error feedback supplied by the server.
    pub fn alert_title(&self) -> Option<&str> {
        self.str_field(fields::ALERT_TITLE).filter(|t| !t.is_empty())
    }

    /// Correlation id echoed back by the server.
    pub fn request_id(&self) -> Option<&str> {
        self.str_field(fields::REQUEST_ID)
    }

    /// Classify this message's type.
    pub fn classify(&self) -> MessageKind {
        MessageKind::classify(&self.kind)
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> EwdResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The structured error object handed to the application's `error` handler.
    pub fn socket_error(message_type: &str, error: &str) -> Self {
        Message::new(message_types::ERROR)
            .with(fields::MESSAGE_TYPE, message_type)
            .with(fields::ERROR, error)
    }
}

/// Routing category of a message type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// The socket is up and the server awaits registration (`EWD.connected`).
    Connected,
    /// Registration confirmation carrying the token (`EWD.registered`).
    Registered,
    /// Registration request (`EWD.register`); client to server only.
    Register,
    /// Keep-alive no-op (`keepAlive`).
    KeepAlive,
    /// Form submission response (type contains `EWD.form.`).
    Form(String),
    /// Server-reported error (type contains `EWD.error`).
    ServerError(String),
    /// Any application-defined type.
    Application(String),
}

impl MessageKind {
    /// Classify a message type string.
    pub fn classify(s: &str) -> Self {
        match s {
            message_types::CONNECTED => Self::Connected,
            message_types::REGISTERED => Self::Registered,
            message_types::REGISTER => Self::Register,
            message_types::KEEP_ALIVE => Self::KeepAlive,
            other if other.contains(message_types::FORM_PREFIX) => Self::Form(other.to_string()),
            other if other.contains(message_types::ERROR_PREFIX) => {
                Self::ServerError(other.to_string())
            }
            other => Self::Application(other.to_string()),
        }
    }

    /// Convert back to the wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => message_types::CONNECTED,
            Self::Registered => message_types::REGISTERED,
            Self::Register => message_types::REGISTER,
            Self::KeepAlive => message_types::KEEP_ALIVE,
            Self::Form(s) | Self::ServerError(s) | Self::Application(s) => s.as_str(),
        }
    }

    /// Whether the type is one the client or server reserves.
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

/// Registration state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No token yet; only the registration request may be sent.
    Unregistered,
    /// Token issued; the outbound sender is available.
    Registered,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Registered => write!(f, "registered"),
        }
    }
}
