//! Feature subsystem errors.

use relay_core::{Feature, WsError};

/// Errors raised while resolving or reading feature data.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// No provider registered for the feature. A configuration error —
    /// should not occur in a correctly wired deployment.
    #[error("no feature provider registered for [{0}]")]
    NotImplemented(Feature),

    /// The requesting identity is not allowed to read this feature.
    #[error("{0}")]
    Unauthorized(String),

    /// Provider-internal failure.
    #[error("{0}")]
    Internal(String),
}

impl From<FeatureError> for WsError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::Unauthorized(msg) => Self::Unauthorized(msg),
            FeatureError::NotImplemented(_) | FeatureError::Internal(_) => {
                Self::Unknown(err.to_string())
            }
        }
    }
}
