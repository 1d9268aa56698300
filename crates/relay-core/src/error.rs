//! Connection-scoped protocol error taxonomy.
//!
//! These errors are delivered to the single offending connection as a typed
//! `error` event; they are never broadcast.

use serde_json::{Value, json};

/// Typed protocol error sent back to one connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WsError {
    /// The message could not be understood.
    #[error("{0}")]
    BadRequest(String),

    /// The connection is not authorized for this message.
    #[error("{0}")]
    Unauthorized(String),

    /// Anything else that went wrong while handling the message.
    #[error("{0}")]
    Unknown(String),
}

impl WsError {
    /// Wire discriminant for this variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequest",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Wire-format body of the `error` event.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "type": self.kind(),
            "message": self.to_string(),
        })
    }
}
