//! Server-pushed wire event names and feature event-id construction.
//!
//! Feature-scoped events carry the feature in brackets so a client can
//! register one handler per `(event, feature)` pair:
//! `feature_data_changed[COUNTER]`.

use crate::feature::Feature;

/// Sent once right after the transport connect, carrying the connection id.
pub const CONNECTED: &str = "connected";
/// Typed protocol error delivered to a single connection.
pub const ERROR: &str = "error";
/// Reply to any of the ping variants.
pub const PONG: &str = "pong";
/// Auth accepted; data echoes the request reason.
pub const AUTHORIZED: &str = "authorized";
/// Auth rejected; data echoes the request reason.
pub const AUTH_ERROR: &str = "auth_error";
/// Subscribe succeeded; feature-scoped, data carries the initial payload.
pub const FEATURE_ADDED: &str = "feature_added";
/// Subscribe raced a disconnect; feature-scoped.
pub const FEATURE_NOT_ADDED: &str = "feature_not_added";
/// Feature datum created; feature-scoped.
pub const FEATURE_DATA_ADDED: &str = "feature_data_added";
/// Feature datum changed; feature-scoped.
pub const FEATURE_DATA_CHANGED: &str = "feature_data_changed";
/// Feature datum deleted; feature-scoped, data carries the id.
pub const FEATURE_DATA_REMOVED: &str = "feature_data_removed";

/// Build the wire id of a feature-scoped event: `"<event>[<FEATURE>]"`.
#[must_use]
pub fn feature_event_id(event: &str, feature: Feature) -> String {
    format!("{event}[{feature}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_event_id_format() {
        assert_eq!(
            feature_event_id(FEATURE_DATA_CHANGED, Feature::Counter),
            "feature_data_changed[COUNTER]"
        );
    }

    #[test]
    fn feature_event_id_uses_wire_feature_name() {
        assert_eq!(
            feature_event_id(FEATURE_ADDED, Feature::ClientMonitor),
            "feature_added[CLIENT_MONITOR]"
        );
    }
}
