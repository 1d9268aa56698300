//! Application configuration feature.
//!
//! In-memory stand-in for the persistent app-config store. This is the
//! bootstrap feature: it is initialized explicitly at startup (before the
//! locator runs) and every connection keeps its bit from connect onward.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info};

use relay_core::{Auth, AuthorizedRoles, Feature};

use crate::broadcast::Broadcaster;
use crate::error::FeatureError;
use crate::provider::{FeatureDataProvider, FeatureNotifier};

/// Provider of the `APP_CONFIG` feature.
pub struct AppConfigProvider {
    entries: RwLock<BTreeMap<String, Value>>,
    notifier: FeatureNotifier,
}

impl AppConfigProvider {
    /// Create the provider with its notifier.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            notifier: FeatureNotifier::new(Feature::AppConfig, broadcaster),
        }
    }

    /// Set a config value and announce the change to all subscribers.
    pub fn set(&self, key: &str, value: Value) {
        let payload = json!({ "key": key, "value": value });
        let _ = self.entries.write().insert(key.to_owned(), value);
        debug!(key, "app config changed");
        self.notifier.data_changed(payload, None);
    }

    /// Read a config value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl FeatureDataProvider for AppConfigProvider {
    fn feature(&self) -> Feature {
        Feature::AppConfig
    }

    fn authorized_roles(&self) -> AuthorizedRoles {
        AuthorizedRoles::AnyRole
    }

    async fn init(&self) -> Result<(), FeatureError> {
        info!("app config provider initialized");
        Ok(())
    }

    async fn initial_data(&self, _user: Option<&Auth>) -> Result<Vec<Value>, FeatureError> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect())
    }
}
