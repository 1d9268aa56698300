//! Feature → provider resolution, authorization and boot initialization.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use relay_core::{Auth, AuthorizedRoles, Feature};

use crate::error::FeatureError;
use crate::provider::FeatureDataProvider;

/// Maps each feature to its data provider.
#[derive(Default)]
pub struct FeatureLocator {
    providers: HashMap<Feature, Arc<dyn FeatureDataProvider>>,
}

impl FeatureLocator {
    /// Create an empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own feature.
    pub fn register(&mut self, provider: Arc<dyn FeatureDataProvider>) {
        let _ = self.providers.insert(provider.feature(), provider);
    }

    /// Initialize every registered provider, in feature declaration order.
    ///
    /// App config is skipped: it is the bootstrap feature and is initialized
    /// explicitly at the very beginning of startup, before the locator runs.
    /// Initialization is sequential — later providers may assume earlier
    /// ones already populated their caches.
    pub async fn init(&self) -> Result<(), FeatureError> {
        info!("feature locator initializing providers");
        for feature in Feature::ALL {
            if feature == Feature::AppConfig {
                continue;
            }
            let Some(provider) = self.providers.get(&feature) else {
                debug!(%feature, "no provider registered, skipping init");
                continue;
            };
            provider.init().await?;
            debug!(%feature, "provider initialized");
        }
        info!("feature locator initialized");
        Ok(())
    }

    /// Initial data of a feature for a (possibly absent) identity.
    ///
    /// Providers declaring [`AuthorizedRoles::AnyRole`] skip the check;
    /// anything else requires a present user with at least one overlapping
    /// role.
    pub async fn initial_data(
        &self,
        user: Option<&Auth>,
        feature: Feature,
    ) -> Result<Vec<Value>, FeatureError> {
        let provider = self.provider_for(feature)?;

        if !provider.authorized_roles().authorizes(user) {
            let who = user.map_or("<anonymous>", |auth| auth.name.as_str());
            let msg = format!("{who}: not authorized to read feature [{feature}]");
            error!("{msg}");
            return Err(FeatureError::Unauthorized(msg));
        }

        provider.initial_data(user).await
    }

    /// Whether a provider is registered for the feature.
    #[must_use]
    pub fn has_provider(&self, feature: Feature) -> bool {
        self.providers.contains_key(&feature)
    }

    fn provider_for(&self, feature: Feature) -> Result<&Arc<dyn FeatureDataProvider>, FeatureError> {
        self.providers
            .get(&feature)
            .ok_or(FeatureError::NotImplemented(feature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::Role;
    use serde_json::json;

    struct StubProvider {
        feature: Feature,
        roles: AuthorizedRoles,
        init_log: Arc<Mutex<Vec<Feature>>>,
    }

    #[async_trait]
    impl FeatureDataProvider for StubProvider {
        fn feature(&self) -> Feature {
            self.feature
        }

        fn authorized_roles(&self) -> AuthorizedRoles {
            self.roles
        }

        async fn init(&self) -> Result<(), FeatureError> {
            self.init_log.lock().push(self.feature);
            Ok(())
        }

        async fn initial_data(&self, _user: Option<&Auth>) -> Result<Vec<Value>, FeatureError> {
            Ok(vec![json!(self.feature.as_str())])
        }
    }

    fn locator_with(
        entries: &[(Feature, AuthorizedRoles)],
    ) -> (FeatureLocator, Arc<Mutex<Vec<Feature>>>) {
        let init_log = Arc::new(Mutex::new(Vec::new()));
        let mut locator = FeatureLocator::new();
        for (feature, roles) in entries {
            locator.register(Arc::new(StubProvider {
                feature: *feature,
                roles: *roles,
                init_log: init_log.clone(),
            }));
        }
        (locator, init_log)
    }

    fn auth(name: &str, roles: &[Role]) -> Auth {
        Auth {
            id: 1,
            name: name.into(),
            roles: roles.to_vec(),
        }
    }

    #[tokio::test]
    async fn init_runs_in_declaration_order_and_skips_bootstrap() {
        let (locator, log) = locator_with(&[
            (Feature::ClientMonitor, AuthorizedRoles::Roles(&[Role::Admin])),
            (Feature::AppConfig, AuthorizedRoles::AnyRole),
            (Feature::Counter, AuthorizedRoles::AnyRole),
            (Feature::UserConfig, AuthorizedRoles::Roles(&[Role::All])),
        ]);

        locator.init().await.unwrap();

        assert_eq!(
            log.lock().as_slice(),
            [Feature::UserConfig, Feature::Counter, Feature::ClientMonitor]
        );
    }

    #[tokio::test]
    async fn init_tolerates_missing_providers() {
        let (locator, log) = locator_with(&[(Feature::Counter, AuthorizedRoles::AnyRole)]);
        locator.init().await.unwrap();
        assert_eq!(log.lock().as_slice(), [Feature::Counter]);
    }

    #[tokio::test]
    async fn unregistered_feature_is_not_implemented() {
        let (locator, _) = locator_with(&[]);
        let err = locator.initial_data(None, Feature::Counter).await.unwrap_err();
        assert!(matches!(err, FeatureError::NotImplemented(Feature::Counter)));
    }

    #[tokio::test]
    async fn any_role_provider_serves_anonymous_readers() {
        let (locator, _) = locator_with(&[(Feature::Counter, AuthorizedRoles::AnyRole)]);
        let data = locator.initial_data(None, Feature::Counter).await.unwrap();
        assert_eq!(data, vec![json!("COUNTER")]);
    }

    #[tokio::test]
    async fn restricted_provider_rejects_anonymous_readers() {
        let (locator, _) = locator_with(&[(
            Feature::ClientMonitor,
            AuthorizedRoles::Roles(&[Role::Admin]),
        )]);
        let err = locator
            .initial_data(None, Feature::ClientMonitor)
            .await
            .unwrap_err();
        assert!(matches!(err, FeatureError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn restricted_provider_rejects_wrong_role() {
        let (locator, _) = locator_with(&[(
            Feature::ClientMonitor,
            AuthorizedRoles::Roles(&[Role::Admin]),
        )]);
        let user = auth("bob", &[Role::User]);
        let err = locator
            .initial_data(Some(&user), Feature::ClientMonitor)
            .await
            .unwrap_err();
        assert!(matches!(err, FeatureError::Unauthorized(_)));
        assert!(err.to_string().contains("bob"));
    }

    #[tokio::test]
    async fn restricted_provider_serves_matching_role() {
        let (locator, _) = locator_with(&[(
            Feature::ClientMonitor,
            AuthorizedRoles::Roles(&[Role::Admin]),
        )]);
        let user = auth("root", &[Role::Admin]);
        let data = locator
            .initial_data(Some(&user), Feature::ClientMonitor)
            .await
            .unwrap();
        assert_eq!(data, vec![json!("CLIENT_MONITOR")]);
    }

    #[tokio::test]
    async fn all_sentinel_requires_authentication() {
        let (locator, _) = locator_with(&[(
            Feature::UserConfig,
            AuthorizedRoles::Roles(&[Role::All]),
        )]);

        assert!(locator.initial_data(None, Feature::UserConfig).await.is_err());

        let user = auth("carol", &[Role::User]);
        assert!(
            locator
                .initial_data(Some(&user), Feature::UserConfig)
                .await
                .is_ok()
        );
    }

    #[test]
    fn has_provider_reflects_registration() {
        let (locator, _) = locator_with(&[(Feature::Counter, AuthorizedRoles::AnyRole)]);
        assert!(locator.has_provider(Feature::Counter));
        assert!(!locator.has_provider(Feature::UserConfig));
    }
}
