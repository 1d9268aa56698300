//! Authenticated identity and token state attached to a connection.

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Number of token characters kept at each end when redacting.
pub const SHORT_TOKEN_LEN: usize = 5;

/// Authenticated identity resolved from a validated token.
///
/// Immutable once computed; re-authentication replaces the whole value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    /// User id in the backing user store.
    pub id: i64,
    /// Display / login name.
    pub name: String,
    /// Roles granted to this user.
    pub roles: Vec<Role>,
}

/// State of the bearer token last presented on a connection.
///
/// Recomputed on every auth message. The raw token never leaves this
/// subsystem unredacted — monitoring snapshots carry the short form only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// The raw bearer token.
    pub token: String,
    /// Whether the token passed verification. Flipped to `false` when the
    /// guard observes expiration.
    pub valid: bool,
    /// Expiration as epoch seconds (0 when unknown).
    pub expiration: i64,
    /// Why the token is invalid, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TokenInfo {
    /// The default result of token validation: invalid, unknown expiry.
    #[must_use]
    pub fn invalid(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            valid: false,
            expiration: 0,
            reason: None,
        }
    }

    /// Copy with the raw token replaced by its redacted form.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            token: redact_token(&self.token),
            ..self.clone()
        }
    }
}

/// Why a client is (re-)authenticating. Echoed back so the client can match
/// the response to the request that caused it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthReason {
    /// Fresh login.
    Login,
    /// Re-attach after a transport reconnect.
    ReConnect,
}

/// Redact a token to a short fixed-length prefix/suffix form.
///
/// Tokens shorter than `SHORT_TOKEN_LEN * SHORT_TOKEN_LEN` keep only the
/// prefix, so prefix and suffix can never overlap.
#[must_use]
pub fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    if token.len() < SHORT_TOKEN_LEN * SHORT_TOKEN_LEN {
        return token.chars().take(SHORT_TOKEN_LEN).collect();
    }
    let prefix: String = token.chars().take(SHORT_TOKEN_LEN).collect();
    let suffix: String = token
        .chars()
        .skip(token.chars().count() - SHORT_TOKEN_LEN)
        .collect();
    format!("{prefix}.....{suffix}")
}
