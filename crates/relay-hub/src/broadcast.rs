//! Publish filter and group-send delegation.
//!
//! The broadcaster sits between feature data providers and the transport.
//! Before handing an event to the transport's group-send primitive it checks
//! the aggregate feature bitmask: if no live connection holds the feature's
//! bit, the send is skipped entirely. This is a pure optimization —
//! correctness does not depend on it, since no connection would be in the
//! destination group anyway.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, trace};

use relay_core::{Distribution, Feature, GroupId, events, feature};

use crate::registry::ActiveFeatures;

/// Transport group-send primitive.
///
/// Fire-and-forget: implementations must never block or fail the caller; a
/// transport failure is logged, not propagated.
pub trait GroupSender: Send + Sync {
    /// Deliver an event to every connection joined to the group.
    fn send_to_group(&self, group: &GroupId, event_id: &str, payload: &Value);
}

/// Destination of a broadcast: a feature, a user, or a user-scoped feature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastTarget {
    /// Target feature, if any.
    pub feature: Option<Feature>,
    /// Owning user for user-scoped distribution.
    pub user: Option<String>,
}

impl BroadcastTarget {
    /// Target all subscribers of a feature (per its distribution mode).
    #[must_use]
    pub fn feature(feature: Feature) -> Self {
        Self {
            feature: Some(feature),
            user: None,
        }
    }

    /// Target subscribers of a feature scoped to one owning user.
    #[must_use]
    pub fn feature_for_user(feature: Feature, user: impl Into<String>) -> Self {
        Self {
            feature: Some(feature),
            user: Some(user.into()),
        }
    }

    /// Target all connections authenticated as one user.
    #[must_use]
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            feature: None,
            user: Some(user.into()),
        }
    }

    /// Resolve the destination group name.
    ///
    /// `None` means the target is unroutable: either empty, or a
    /// user-specific feature without an owning user — the latter is a
    /// contract violation on the caller's side and is logged as an error.
    #[must_use]
    pub fn group(&self) -> Option<GroupId> {
        match (self.feature, self.user.as_deref()) {
            (Some(f), user) => match feature::config_for(f).distribution {
                Distribution::Global => Some(feature::feature_group(f, None)),
                Distribution::UserSpecific => {
                    if user.is_none() {
                        error!(feature = %f, "user-specific feature broadcast requires a user target");
                        return None;
                    }
                    Some(feature::feature_group(f, user))
                }
            },
            (None, Some(user)) => Some(feature::user_group(user)),
            (None, None) => None,
        }
    }
}

/// Routes feature data events to the transport, filtered by the aggregate
/// feature bitmask.
pub struct Broadcaster {
    active: Arc<ActiveFeatures>,
    transport: Arc<dyn GroupSender>,
}

impl Broadcaster {
    /// Create a broadcaster over the registry's aggregate handle and the
    /// transport's group-send primitive.
    pub fn new(active: Arc<ActiveFeatures>, transport: Arc<dyn GroupSender>) -> Self {
        Self { active, transport }
    }

    /// Broadcast `payload` as `event` to the target's group.
    ///
    /// Feature-scoped events get a feature-qualified event id
    /// (`event[FEATURE]`). Skips the send when the target feature's bit is
    /// held by no live connection.
    pub fn broadcast(&self, target: &BroadcastTarget, event: &str, payload: &Value) {
        let Some(group) = target.group() else {
            return;
        };

        let event_id = match target.feature {
            Some(feature) => events::feature_event_id(event, feature),
            None => event.to_owned(),
        };

        if let Some(feature) = target.feature {
            let active = self.active.get();
            if !active.contains(feature) {
                trace!(
                    %feature,
                    active = %active.describe(),
                    "feature not subscribed anywhere, event not broadcast"
                );
                return;
            }
        }

        debug!(event = %event_id, group = %group, "broadcast");
        self.transport.send_to_group(&group, &event_id, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Mock transport recording every group send.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, Value)>>,
    }

    impl RecordingSender {
        fn calls(&self) -> Vec<(String, String, Value)> {
            self.sent.lock().clone()
        }
    }

    impl GroupSender for RecordingSender {
        fn send_to_group(&self, group: &GroupId, event_id: &str, payload: &Value) {
            self.sent
                .lock()
                .push((group.as_str().to_owned(), event_id.to_owned(), payload.clone()));
        }
    }

    fn active_with(features: &[Feature]) -> Arc<ActiveFeatures> {
        use relay_core::ConnectionId;

        use crate::connection::HeaderSnapshot;
        use crate::registry::ConnectionRegistry;

        let registry = ConnectionRegistry::new();
        let conn = registry.add(
            ConnectionId::from("seed"),
            "127.0.0.1:1".into(),
            HeaderSnapshot::default(),
        );
        for feature in features {
            registry.add_feature(&conn.id, *feature);
        }
        registry.active_features()
    }

    #[test]
    fn global_target_resolves_to_feature_group() {
        let target = BroadcastTarget::feature(Feature::Counter);
        assert_eq!(target.group().unwrap().as_str(), "COUNTER@");
    }

    #[test]
    fn user_specific_target_includes_user() {
        let target = BroadcastTarget::feature_for_user(Feature::UserConfig, "alice");
        assert_eq!(target.group().unwrap().as_str(), "USER_CONFIG@alice");
    }

    #[test]
    fn user_specific_target_without_user_is_unroutable() {
        let target = BroadcastTarget::feature(Feature::UserConfig);
        assert!(target.group().is_none());
    }

    #[test]
    fn bare_user_target_resolves_to_user_group() {
        let target = BroadcastTarget::user("bob");
        assert_eq!(target.group().unwrap().as_str(), "@bob");
    }

    #[test]
    fn empty_target_is_unroutable() {
        assert!(BroadcastTarget::default().group().is_none());
    }

    #[test]
    fn broadcast_sends_when_feature_is_active() {
        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Broadcaster::new(active_with(&[Feature::Counter]), sender.clone());

        broadcaster.broadcast(
            &BroadcastTarget::feature(Feature::Counter),
            events::FEATURE_DATA_CHANGED,
            &json!(42),
        );

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "COUNTER@");
        assert_eq!(calls[0].1, "feature_data_changed[COUNTER]");
        assert_eq!(calls[0].2, json!(42));
    }

    #[test]
    fn broadcast_skips_when_no_connection_holds_the_bit() {
        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Broadcaster::new(active_with(&[Feature::AppConfig]), sender.clone());

        broadcaster.broadcast(
            &BroadcastTarget::feature(Feature::Counter),
            events::FEATURE_DATA_CHANGED,
            &json!(1),
        );

        assert!(sender.calls().is_empty());
    }

    #[test]
    fn broadcast_skips_unroutable_user_specific_target() {
        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Broadcaster::new(active_with(&[Feature::UserConfig]), sender.clone());

        broadcaster.broadcast(
            &BroadcastTarget::feature(Feature::UserConfig),
            events::FEATURE_DATA_CHANGED,
            &json!({"k": "v"}),
        );

        assert!(sender.calls().is_empty());
    }

    #[test]
    fn user_target_bypasses_the_feature_filter() {
        let sender = Arc::new(RecordingSender::default());
        // empty aggregate — user pushes are not feature-gated
        let broadcaster = Broadcaster::new(active_with(&[]), sender.clone());

        broadcaster.broadcast(&BroadcastTarget::user("alice"), "logout_on_user_change", &json!(null));

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "@alice");
        assert_eq!(calls[0].1, "logout_on_user_change");
    }

    #[test]
    fn user_scoped_feature_broadcast_sends_to_owner_group() {
        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Broadcaster::new(active_with(&[Feature::UserConfig]), sender.clone());

        broadcaster.broadcast(
            &BroadcastTarget::feature_for_user(Feature::UserConfig, "alice"),
            events::FEATURE_DATA_CHANGED,
            &json!({"theme": "dark"}),
        );

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "USER_CONFIG@alice");
        assert_eq!(calls[0].1, "feature_data_changed[USER_CONFIG]");
    }
}
