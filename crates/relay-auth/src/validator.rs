//! JWT verification and decoding.

use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode};
use serde::{Deserialize, Serialize};

use relay_core::Role;

/// Claims carried by a relay bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id as issued by the login surface).
    pub sub: String,
    /// Login name used to resolve the identity.
    pub username: String,
    /// Roles granted at issue time.
    pub roles: Vec<Role>,
    /// Expiration, epoch seconds.
    pub exp: i64,
    /// Issued-at, epoch seconds.
    pub iat: i64,
}

/// Verifies and decodes bearer tokens (HS256).
pub struct TokenValidator {
    key: DecodingKey,
    verify: Validation,
    decode_only: Validation,
}

impl TokenValidator {
    /// Create a validator from the shared signing secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut verify = Validation::new(Algorithm::HS256);
        // Expiry is re-checked lazily by the message guard; no leeway here
        // so a token expired at auth time is rejected immediately.
        verify.leeway = 0;

        let mut decode_only = Validation::new(Algorithm::HS256);
        decode_only.insecure_disable_signature_validation();
        decode_only.validate_exp = false;
        decode_only.required_spec_claims.clear();
        decode_only.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret),
            verify,
            decode_only,
        }
    }

    /// Verify signature, structure and expiry, and decode the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.verify).map(|data: TokenData<Claims>| data.claims)
    }

    /// Best-effort decode without verification.
    ///
    /// Used only to recover the expiration of a token that already failed
    /// [`Self::verify`], for diagnostics. Never treat the result as trusted.
    #[must_use]
    pub fn decode_unverified(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.key, &self.decode_only)
            .map(|data| data.claims)
            .ok()
    }
}
