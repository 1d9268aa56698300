//! WebSocket wire-format messages.
//!
//! Frames are JSON envelopes: `{"event": "...", "data": ...}` in both
//! directions. Feature-scoped outbound events qualify the event name with
//! the feature (`feature_added[COUNTER]`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::{AuthReason, Feature, events};

/// Incoming client message.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered without authentication.
    Ping(Option<Value>),
    /// Liveness probe through the full auth guard.
    PingWithAuth(Option<Value>),
    /// Liveness probe restricted to administrators.
    PingAdminOnly(Option<Value>),
    /// Attach authentication to this connection.
    Auth(AuthRequest),
    /// Drop authentication from this connection.
    Logout,
    /// Subscribe to a feature.
    AddFeature(Feature),
    /// Unsubscribe from a feature.
    RemoveFeature(Feature),
}

impl ClientMessage {
    /// Wire name of the message, for logs and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping(_) => "ping",
            Self::PingWithAuth(_) => "ping_with_auth",
            Self::PingAdminOnly(_) => "ping_admin_only",
            Self::Auth(_) => "auth",
            Self::Logout => "logout",
            Self::AddFeature(_) => "add_feature",
            Self::RemoveFeature(_) => "remove_feature",
        }
    }
}

/// Payload of the `auth` message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Bearer token; tolerated absent (the message is then ignored).
    #[serde(default)]
    pub token: Option<String>,
    /// Why the client is authenticating; echoed in the response.
    pub reason: AuthReason,
}

/// Outgoing server event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Event name, feature-qualified where applicable.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl OutboundEvent {
    /// Build a plain event.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build a feature-scoped event (`"<event>[<FEATURE>]"`).
    #[must_use]
    pub fn feature_scoped(event: &str, feature: Feature, data: Value) -> Self {
        Self {
            event: events::feature_event_id(event, feature),
            data,
        }
    }
}
