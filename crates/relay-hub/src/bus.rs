//! Typed feature event bus.
//!
//! Write paths publish [`FeatureEvent`]s here instead of calling the
//! broadcast machinery directly; one listener task per provider re-dispatches
//! matching events into the provider's notifier. Keying events by the typed
//! `(feature, action)` pair replaces the string-concatenated topic names of
//! older designs, so topic naming cannot silently drift.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use relay_core::Feature;

use crate::provider::FeatureNotifier;

/// What happened to a feature datum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureAction {
    /// A datum was created.
    Added,
    /// A datum was changed.
    Changed,
    /// A datum was deleted; the payload is its id.
    Removed,
}

/// One data-change announcement from a write path.
#[derive(Clone, Debug)]
pub struct FeatureEvent {
    /// The feature the datum belongs to.
    pub feature: Feature,
    /// What happened.
    pub action: FeatureAction,
    /// The datum (or its id, for removals).
    pub payload: Value,
    /// Owning user for user-scoped features.
    pub owner: Option<String>,
}

/// Fan-out channel for feature events.
pub struct FeatureBus {
    tx: broadcast::Sender<FeatureEvent>,
}

impl FeatureBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Fire-and-forget: with no live listener the event
    /// is dropped silently.
    pub fn publish(&self, event: FeatureEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe a new listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeatureEvent> {
        self.tx.subscribe()
    }
}

impl Default for FeatureBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Listener loop pairing one bus subscription with one provider's notifier.
///
/// Filters events to the notifier's feature and re-dispatches them into the
/// matching notify call. Exits when the bus is dropped.
pub async fn run_feature_listener(
    mut rx: broadcast::Receiver<FeatureEvent>,
    notifier: FeatureNotifier,
) {
    let feature = notifier.feature();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.feature != feature {
                    continue;
                }
                debug!(%feature, action = ?event.action, "dispatching feature event");
                let owner = event.owner.as_deref();
                match event.action {
                    FeatureAction::Added => notifier.data_added(event.payload, owner),
                    FeatureAction::Changed => notifier.data_changed(event.payload, owner),
                    FeatureAction::Removed => notifier.data_removed(event.payload, owner),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%feature, lagged = n, "feature listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(%feature, "feature bus closed, listener exiting");
                break;
            }
        }
    }
}
