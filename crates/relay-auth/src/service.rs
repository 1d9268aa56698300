//! Token resolution into connection auth state.

use std::sync::Arc;

use tracing::{debug, warn};

use relay_core::{Auth, TokenInfo, redact_token};

use crate::directory::UserDirectory;
use crate::validator::TokenValidator;

/// Resolves a presented bearer token into `(TokenInfo, Option<Auth>)`.
///
/// This function never fails outward: the gateway must always be able to
/// answer with a structured not-authorized outcome, so verification failure
/// is represented as state, not as an error.
pub struct AuthService {
    validator: TokenValidator,
    directory: Arc<dyn UserDirectory>,
}

impl AuthService {
    /// Create the service from a validator and the user-directory
    /// collaborator.
    pub fn new(validator: TokenValidator, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            validator,
            directory,
        }
    }

    /// Resolve a token.
    ///
    /// - Verified token + known user → `valid: true` with the resolved auth.
    /// - Verified token + unknown user → `valid: true`, no auth.
    /// - Failed verification → `valid: false`; a best-effort unverified
    ///   decode recovers the expiration for diagnostics.
    pub async fn resolve(&self, token: &str) -> (TokenInfo, Option<Auth>) {
        match self.validator.verify(token) {
            Ok(claims) => {
                let info = TokenInfo {
                    token: token.to_owned(),
                    valid: true,
                    expiration: claims.exp,
                    reason: None,
                };
                let auth = self.directory.validate_user(&claims.username).await;
                if auth.is_none() {
                    warn!(
                        username = %claims.username,
                        "token verified but user not found in directory"
                    );
                }
                (info, auth)
            }
            Err(err) => {
                let reason = format!("error decoding token in auth handler: {err}");
                warn!(token = %redact_token(token), %reason, "token verification failed");

                let expiration = match self.validator.decode_unverified(token) {
                    Some(claims) => claims.exp,
                    None => {
                        debug!(token = %redact_token(token), "token cannot be decoded at all");
                        0
                    }
                };
                let info = TokenInfo {
                    token: token.to_owned(),
                    valid: false,
                    expiration,
                    reason: Some(reason),
                };
                (info, None)
            }
        }
    }
}
