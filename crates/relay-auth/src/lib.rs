//! # relay-auth
//!
//! Bearer-token verification and identity resolution for relay connections.
//!
//! - [`TokenValidator`]: verifies and decodes JWTs (HS256)
//! - [`UserDirectory`]: collaborator trait resolving a username to an
//!   [`relay_core::Auth`]
//! - [`AuthService`]: turns a raw token into `(TokenInfo, Option<Auth>)`
//!   without ever failing outward — invalid tokens become state, not errors
//!
//! Login credential checking (password flow) is out of scope; this crate
//! only consumes tokens that some login surface already issued.

#![deny(unsafe_code)]

pub mod directory;
pub mod service;
pub mod validator;

pub use directory::{StaticUserDirectory, UserDirectory};
pub use service::AuthService;
pub use validator::{Claims, TokenValidator};
