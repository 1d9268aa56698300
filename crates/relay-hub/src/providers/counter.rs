//! Demo counter feature.
//!
//! A periodically ticking number, useful for watching global fan-out work
//! without any real data source behind it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;

use relay_core::{Auth, AuthorizedRoles, Feature};

use crate::broadcast::Broadcaster;
use crate::error::FeatureError;
use crate::provider::{FeatureDataProvider, FeatureNotifier};

/// Provider of the `COUNTER` feature.
pub struct CounterProvider {
    value: Mutex<i64>,
    notifier: FeatureNotifier,
}

impl CounterProvider {
    /// Create the provider with its notifier.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            value: Mutex::new(0),
            notifier: FeatureNotifier::new(Feature::Counter, broadcaster),
        }
    }

    /// Increment the counter and announce the new value to subscribers.
    pub fn tick(&self) -> i64 {
        let value = {
            let mut value = self.value.lock();
            *value += 1;
            *value
        };
        debug!(value, "counter changed");
        self.notifier.data_changed(json!(value), None);
        value
    }

    /// Overwrite the counter without notifying.
    pub fn set(&self, value: i64) {
        *self.value.lock() = value;
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> i64 {
        *self.value.lock()
    }
}

#[async_trait]
impl FeatureDataProvider for CounterProvider {
    fn feature(&self) -> Feature {
        Feature::Counter
    }

    fn authorized_roles(&self) -> AuthorizedRoles {
        AuthorizedRoles::AnyRole
    }

    async fn init(&self) -> Result<(), FeatureError> {
        debug!("counter provider initialized");
        Ok(())
    }

    async fn initial_data(&self, _user: Option<&Auth>) -> Result<Vec<Value>, FeatureError> {
        Ok(vec![json!(self.value())])
    }
}
