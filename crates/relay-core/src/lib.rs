//! # relay-core
//!
//! Foundation types for the relay connection and feature-subscription
//! registry.
//!
//! This crate provides the shared vocabulary that all other relay crates
//! depend on:
//!
//! - **Branded IDs**: `ConnectionId`, `GroupId` as newtypes for type safety
//! - **Roles**: `Role` enum, `RoleBits` flag encoding, `AuthorizedRoles`
//! - **Features**: `Feature` enum, `FeatureBits` flag encoding, the static
//!   `FeatureConfig` table with reserved bit ranges per role class
//! - **Auth model**: `Auth`, `TokenInfo`, token redaction helpers
//! - **Wire events**: server-pushed event names and feature event-id
//!   construction
//! - **Errors**: the connection-scoped `WsError` taxonomy

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
pub mod events;
pub mod feature;
pub mod ids;
pub mod roles;

pub use auth::{Auth, AuthReason, TokenInfo, redact_token};
pub use error::WsError;
pub use feature::{Distribution, Feature, FeatureBits, FeatureConfig};
pub use ids::{ConnectionId, GroupId};
pub use roles::{AuthorizedRoles, Role, RoleBits};
