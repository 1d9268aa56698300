//! Roles and their fixed-width bit encoding.
//!
//! A connection caches its authenticated user's roles as [`RoleBits`] so the
//! per-message guard can test role restrictions with a single mask instead
//! of walking the role list on every inbound message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse authorization grouping attached to an authenticated identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Ordinary authenticated user.
    User,
    /// Sentinel used in authorization lists: any authenticated user.
    All,
}

/// Bit encoding of a role set (one bit per concrete role).
///
/// [`Role::All`] is a list sentinel, not a grantable role, and has no bit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleBits(u32);

impl RoleBits {
    /// No roles.
    pub const NONE: Self = Self(0);
    /// Bit for [`Role::Admin`].
    pub const ADMIN: Self = Self(0x1);
    /// Bit for [`Role::User`].
    pub const USER: Self = Self(0x2);

    /// Compute the bit encoding of a role list.
    #[must_use]
    pub fn from_roles(roles: &[Role]) -> Self {
        let mut bits = Self::NONE;
        for role in roles {
            match role {
                Role::Admin => bits.0 |= Self::ADMIN.0,
                Role::User => bits.0 |= Self::USER.0,
                Role::All => {}
            }
        }
        bits
    }

    /// Whether any bit overlaps with `other`.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no bits are set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit value.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RoleBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Roles allowed to read a feature's data.
///
/// `AnyRole` is the explicit "no restriction" sentinel; a role list with
/// [`Role::All`] admits any *authenticated* user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizedRoles {
    /// No restriction — even unauthenticated connections qualify.
    AnyRole,
    /// At least one of the listed roles is required.
    Roles(&'static [Role]),
}

impl AuthorizedRoles {
    /// Whether the given (possibly absent) identity satisfies this policy.
    #[must_use]
    pub fn authorizes(self, auth: Option<&crate::auth::Auth>) -> bool {
        match self {
            Self::AnyRole => true,
            Self::Roles(required) => auth.is_some_and(|auth| {
                required
                    .iter()
                    .any(|role| *role == Role::All || auth.roles.contains(role))
            }),
        }
    }
}
