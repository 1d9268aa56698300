//! Feature data provider contract.
//!
//! A provider owns one feature:
//! - it serves the initial data set when a client subscribes
//! - it announces data changes through its [`FeatureNotifier`]
//!
//! Notification is composition, not inheritance: providers own a notifier
//! value instead of extending a base class, so the broadcast mechanics stay
//! in one place.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use relay_core::{Auth, AuthorizedRoles, Feature, events};

use crate::broadcast::{BroadcastTarget, Broadcaster};
use crate::error::FeatureError;

/// Contract implemented by every feature owner.
#[async_trait]
pub trait FeatureDataProvider: Send + Sync {
    /// The feature owned by this provider.
    fn feature(&self) -> Feature;

    /// Roles allowed to read this feature's data.
    fn authorized_roles(&self) -> AuthorizedRoles;

    /// One-time boot initialization, called by the locator in feature
    /// declaration order. Later providers may rely on earlier ones having
    /// populated their caches.
    async fn init(&self) -> Result<(), FeatureError>;

    /// Initial data set sent to a client on subscribe.
    async fn initial_data(&self, user: Option<&Auth>) -> Result<Vec<Value>, FeatureError>;
}

/// Sends data-change notifications for one feature.
#[derive(Clone)]
pub struct FeatureNotifier {
    feature: Feature,
    broadcaster: Arc<Broadcaster>,
}

impl FeatureNotifier {
    /// Create a notifier for a feature.
    pub fn new(feature: Feature, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            feature,
            broadcaster,
        }
    }

    /// The feature this notifier announces for.
    #[must_use]
    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// Announce a created datum.
    pub fn data_added(&self, payload: Value, owner: Option<&str>) {
        self.notify(events::FEATURE_DATA_ADDED, payload, owner);
    }

    /// Announce a changed datum.
    pub fn data_changed(&self, payload: Value, owner: Option<&str>) {
        self.notify(events::FEATURE_DATA_CHANGED, payload, owner);
    }

    /// Announce a deleted datum; the payload is its id.
    pub fn data_removed(&self, id: Value, owner: Option<&str>) {
        self.notify(events::FEATURE_DATA_REMOVED, id, owner);
    }

    fn notify(&self, event: &str, payload: Value, owner: Option<&str>) {
        let target = match owner {
            Some(user) => BroadcastTarget::feature_for_user(self.feature, user),
            None => BroadcastTarget::feature(self.feature),
        };
        self.broadcaster.broadcast(&target, event, &payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::GroupSender;
    use crate::connection::HeaderSnapshot;
    use crate::registry::ConnectionRegistry;
    use parking_lot::Mutex;
    use relay_core::{ConnectionId, GroupId};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl GroupSender for RecordingSender {
        fn send_to_group(&self, group: &GroupId, event_id: &str, _payload: &Value) {
            self.sent
                .lock()
                .push((group.as_str().to_owned(), event_id.to_owned()));
        }
    }

    fn notifier_with_subscriber(feature: Feature) -> (FeatureNotifier, Arc<RecordingSender>) {
        let registry = ConnectionRegistry::new();
        let conn = registry.add(
            ConnectionId::from("c1"),
            "127.0.0.1:1".into(),
            HeaderSnapshot::default(),
        );
        registry.add_feature(&conn.id, feature);

        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Arc::new(Broadcaster::new(registry.active_features(), sender.clone()));
        (FeatureNotifier::new(feature, broadcaster), sender)
    }

    #[test]
    fn data_added_targets_the_feature_group() {
        let (notifier, sender) = notifier_with_subscriber(Feature::Counter);
        notifier.data_added(json!({"v": 1}), None);

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "COUNTER@");
        assert_eq!(sent[0].1, "feature_data_added[COUNTER]");
    }

    #[test]
    fn data_changed_with_owner_targets_the_user_scoped_group() {
        let (notifier, sender) = notifier_with_subscriber(Feature::UserConfig);
        notifier.data_changed(json!({"theme": "dark"}), Some("alice"));

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "USER_CONFIG@alice");
        assert_eq!(sent[0].1, "feature_data_changed[USER_CONFIG]");
    }

    #[test]
    fn data_removed_carries_the_id_event() {
        let (notifier, sender) = notifier_with_subscriber(Feature::Counter);
        notifier.data_removed(json!("row-7"), None);

        let sent = sender.sent.lock();
        assert_eq!(sent[0].1, "feature_data_removed[COUNTER]");
    }

    #[test]
    fn notifier_is_silent_without_subscribers() {
        let registry = ConnectionRegistry::new();
        let sender = Arc::new(RecordingSender::default());
        let broadcaster = Arc::new(Broadcaster::new(registry.active_features(), sender.clone()));
        let notifier = FeatureNotifier::new(Feature::Counter, broadcaster);

        notifier.data_changed(json!(1), None);
        assert!(sender.sent.lock().is_empty());
    }
}
