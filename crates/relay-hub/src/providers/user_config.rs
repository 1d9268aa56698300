//! Per-user configuration feature.
//!
//! In-memory stand-in for the persistent user-config store. User-specific
//! distribution: a change to alice's config reaches only connections
//! authenticated as alice.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::debug;

use relay_core::{Auth, AuthorizedRoles, Feature, Role};

use crate::broadcast::Broadcaster;
use crate::error::FeatureError;
use crate::provider::{FeatureDataProvider, FeatureNotifier};

/// Provider of the `USER_CONFIG` feature.
pub struct UserConfigProvider {
    entries: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    notifier: FeatureNotifier,
}

impl UserConfigProvider {
    /// Create the provider with its notifier.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            notifier: FeatureNotifier::new(Feature::UserConfig, broadcaster),
        }
    }

    /// Set a value for one user and announce it to that user's subscribers.
    pub fn set(&self, user: &str, key: &str, value: Value) {
        let payload = json!({ "key": key, "value": value });
        {
            let mut entries = self.entries.write();
            let _ = entries
                .entry(user.to_owned())
                .or_default()
                .insert(key.to_owned(), value);
        }
        debug!(user, key, "user config changed");
        self.notifier.data_changed(payload, Some(user));
    }

    /// Read a value for one user.
    #[must_use]
    pub fn get(&self, user: &str, key: &str) -> Option<Value> {
        self.entries.read().get(user)?.get(key).cloned()
    }
}

#[async_trait]
impl FeatureDataProvider for UserConfigProvider {
    fn feature(&self) -> Feature {
        Feature::UserConfig
    }

    fn authorized_roles(&self) -> AuthorizedRoles {
        AuthorizedRoles::Roles(&[Role::All])
    }

    async fn init(&self) -> Result<(), FeatureError> {
        debug!("user config provider initialized");
        Ok(())
    }

    async fn initial_data(&self, user: Option<&Auth>) -> Result<Vec<Value>, FeatureError> {
        let Some(user) = user else {
            // locator authorization guarantees a user; tolerate anyway
            return Ok(Vec::new());
        };
        Ok(self
            .entries
            .read()
            .get(&user.name)
            .map(|values| {
                values
                    .iter()
                    .map(|(key, value)| json!({ "key": key, "value": value }))
                    .collect()
            })
            .unwrap_or_default())
    }
}
