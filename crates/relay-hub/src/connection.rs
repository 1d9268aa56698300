//! Per-connection state.
//!
//! A `ClientConnection` is created on transport connect and removed on
//! disconnect. Everything that changes in between (auth, token, role bits,
//! feature bits) lives behind one mutex so each mutation is atomic.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use relay_core::{Auth, ConnectionId, Feature, FeatureBits, RoleBits, TokenInfo};

/// The request headers captured at connect time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSnapshot {
    /// `Host` header, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// `User-Agent` header, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Mutable connection state guarded as one unit.
#[derive(Debug, Default)]
struct ConnectionState {
    auth: Option<Auth>,
    token_info: Option<TokenInfo>,
    roles: RoleBits,
    features: FeatureBits,
}

/// One live bidirectional connection from a client instance to the server.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection id (stable for the transport lifetime).
    pub id: ConnectionId,
    /// Remote peer address.
    pub remote_addr: String,
    /// Headers captured at connect time.
    pub headers: HeaderSnapshot,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    state: Mutex<ConnectionState>,
}

impl ClientConnection {
    /// Create an unauthenticated connection with no active features.
    #[must_use]
    pub fn new(id: ConnectionId, remote_addr: String, headers: HeaderSnapshot) -> Self {
        Self {
            id,
            remote_addr,
            headers,
            connected_at: Utc::now(),
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Current auth, if the connection is authenticated.
    #[must_use]
    pub fn auth(&self) -> Option<Auth> {
        self.state.lock().auth.clone()
    }

    /// Login name of the authenticated user, if any.
    #[must_use]
    pub fn user_name(&self) -> Option<String> {
        self.state.lock().auth.as_ref().map(|auth| auth.name.clone())
    }

    /// Last token state presented on this connection.
    #[must_use]
    pub fn token_info(&self) -> Option<TokenInfo> {
        self.state.lock().token_info.clone()
    }

    /// Cached role bits of the authenticated user.
    #[must_use]
    pub fn roles(&self) -> RoleBits {
        self.state.lock().roles
    }

    /// Currently subscribed features.
    #[must_use]
    pub fn features(&self) -> FeatureBits {
        self.state.lock().features
    }

    /// Atomically overwrite auth, token info and role bits.
    ///
    /// Role bits are recomputed from the new auth; an absent auth clears
    /// them.
    pub fn set_auth(&self, auth: Option<Auth>, token_info: TokenInfo) {
        let mut state = self.state.lock();
        state.roles = auth
            .as_ref()
            .map(|auth| RoleBits::from_roles(&auth.roles))
            .unwrap_or_default();
        state.auth = auth;
        state.token_info = Some(token_info);
    }

    /// Set a feature bit. Returns `false` when the bit was already set.
    pub fn insert_feature(&self, feature: Feature) -> bool {
        let mut state = self.state.lock();
        let before = state.features;
        state.features = before.with(feature);
        state.features != before
    }

    /// Clear a feature bit. Safe no-op when the bit was never set.
    pub fn remove_feature(&self, feature: Feature) {
        let mut state = self.state.lock();
        state.features = state.features.without(feature);
    }

    /// Clear auth, token and roles and reset features to the baseline set.
    pub fn clear_auth(&self, baseline: FeatureBits) {
        let mut state = self.state.lock();
        state.auth = None;
        state.token_info = None;
        state.roles = RoleBits::NONE;
        state.features = baseline;
    }

    /// Flip the cached token to invalid with the given reason.
    ///
    /// Used by the message guard when it observes expiration; subsequent
    /// messages then fail the cheaper validity check.
    pub fn invalidate_token(&self, reason: &str) {
        let mut state = self.state.lock();
        if let Some(info) = state.token_info.as_mut() {
            info.valid = false;
            info.reason = Some(reason.to_owned());
        }
    }

    /// Monitoring snapshot with the raw token redacted.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state.lock();
        ConnectionSnapshot {
            id: self.id.clone(),
            remote_addr: self.remote_addr.clone(),
            headers: self.headers.clone(),
            connected_at: self.connected_at,
            roles: state.roles,
            active_features: state.features,
            auth: state.auth.clone(),
            token_info: state.token_info.as_ref().map(TokenInfo::redacted),
        }
    }
}

/// Read-only view of a connection for monitoring surfaces.
///
/// The token inside `token_info` is always the redacted short form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    /// Connection id.
    pub id: ConnectionId,
    /// Remote peer address.
    pub remote_addr: String,
    /// Headers captured at connect time.
    pub headers: HeaderSnapshot,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Cached role bits.
    pub roles: RoleBits,
    /// Currently subscribed features.
    pub active_features: FeatureBits,
    /// Authenticated identity, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    /// Redacted token state, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info: Option<TokenInfo>,
}
