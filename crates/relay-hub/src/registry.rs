//! Live-connection table and the aggregate feature bitmask.
//!
//! The registry is the single source of truth for connections. It also owns
//! the server-wide aggregate of all connections' feature bits, used by the
//! broadcaster to skip fan-out work when nobody subscribed to a feature.
//!
//! Invariant: after any mutating operation completes, the aggregate equals
//! the OR-reduction of the live connection set. Adding a bit updates the
//! aggregate incrementally (OR is monotone); removing a bit triggers a full
//! recompute because another connection may still hold it. All mutations run
//! under the table's write lock so a recompute can never interleave with a
//! concurrent bit insert.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tracing::{debug, warn};

use relay_core::{Auth, AuthorizedRoles, ConnectionId, Feature, FeatureBits, Role, TokenInfo};

use crate::connection::{ClientConnection, ConnectionSnapshot, HeaderSnapshot};
use crate::error::FeatureError;
use crate::provider::{FeatureDataProvider, FeatureNotifier};

/// Features every connection keeps regardless of auth state.
///
/// App config is pushed from connect onward and survives logout.
pub const BASELINE_FEATURES: FeatureBits = FeatureBits::from_bits(0x1);

/// Shared handle to the aggregate feature bitmask.
///
/// Owned by the registry, read by the broadcaster's publish filter.
#[derive(Debug, Default)]
pub struct ActiveFeatures(Mutex<FeatureBits>);

impl ActiveFeatures {
    /// Current aggregate.
    #[must_use]
    pub fn get(&self) -> FeatureBits {
        *self.0.lock()
    }

    fn insert(&self, bits: FeatureBits) {
        let mut current = self.0.lock();
        *current = current.union(bits);
    }

    fn set(&self, bits: FeatureBits) {
        *self.0.lock() = bits;
    }
}

/// Single source of truth for live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    active: Arc<ActiveFeatures>,
    /// Late-bound notifier for the client-monitor feature. Unset in unit
    /// tests, in which case notifications are skipped.
    monitor: OnceLock<FeatureNotifier>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active: Arc::new(ActiveFeatures::default()),
            monitor: OnceLock::new(),
        }
    }

    /// Shared handle to the aggregate bitmask for the broadcaster.
    #[must_use]
    pub fn active_features(&self) -> Arc<ActiveFeatures> {
        Arc::clone(&self.active)
    }

    /// Bind the client-monitor notifier. Called once during boot wiring.
    pub fn bind_monitor(&self, notifier: FeatureNotifier) {
        if self.monitor.set(notifier).is_err() {
            warn!("client-monitor notifier already bound");
        }
    }

    /// Register a new, unauthenticated connection.
    pub fn add(
        &self,
        id: ConnectionId,
        remote_addr: String,
        headers: HeaderSnapshot,
    ) -> Arc<ClientConnection> {
        debug!(conn = %id, %remote_addr, "connection added");
        let conn = Arc::new(ClientConnection::new(id.clone(), remote_addr, headers));
        {
            let mut connections = self.connections.write();
            let _ = connections.insert(id, Arc::clone(&conn));
        }
        self.notify_added(&conn);
        conn
    }

    /// Remove a connection and recompute the aggregate from the remainder.
    pub fn remove(&self, id: &ConnectionId) {
        debug!(conn = %id, "connection removed");
        {
            let mut connections = self.connections.write();
            let _ = connections.remove(id);
            self.recompute_locked(&connections);
        }
        if let Some(monitor) = self.monitor.get() {
            monitor.data_removed(json!(id), None);
        }
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// All live connections.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Connections authenticated as the given user.
    #[must_use]
    pub fn all_by_user(&self, user_name: &str) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.user_name().as_deref() == Some(user_name))
            .cloned()
            .collect()
    }

    /// Redacted snapshots of all live connections, for monitoring surfaces.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .read()
            .values()
            .map(|conn| conn.snapshot())
            .collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Atomically overwrite a connection's auth, token info and role bits.
    ///
    /// Returns `false` when the connection is gone (race with disconnect).
    pub fn set_auth(&self, id: &ConnectionId, auth: Option<Auth>, token_info: TokenInfo) -> bool {
        let Some(conn) = self.get(id) else {
            warn!(conn = %id, "connection not found for auth");
            return false;
        };
        conn.set_auth(auth, token_info);
        self.notify_changed(&conn);
        true
    }

    /// OR a feature bit into a connection and the aggregate.
    ///
    /// Incremental aggregate update is safe here because OR is monotone.
    /// Idempotent per `(connection, feature)`.
    pub fn add_feature(&self, id: &ConnectionId, feature: Feature) {
        let conn = {
            let connections = self.connections.write();
            let Some(conn) = connections.get(id).cloned() else {
                debug!(conn = %id, %feature, "connection not found for feature add");
                return;
            };
            let _ = conn.insert_feature(feature);
            self.active.insert(feature.bit());
            conn
        };
        debug!(conn = %id, %feature, active = %self.active.get(), "feature added");
        self.notify_changed(&conn);
    }

    /// Clear a feature bit on a connection and fully recompute the
    /// aggregate — another connection may still hold the same bit.
    pub fn remove_feature(&self, id: &ConnectionId, feature: Feature) {
        let conn = {
            let connections = self.connections.write();
            let Some(conn) = connections.get(id).cloned() else {
                debug!(conn = %id, %feature, "connection not found for feature remove");
                return;
            };
            conn.remove_feature(feature);
            self.recompute_locked(&connections);
            conn
        };
        debug!(conn = %id, %feature, active = %self.active.get(), "feature removed");
        self.notify_changed(&conn);
    }

    /// Clear a connection's auth state and reset its features to the
    /// baseline set, then recompute the aggregate.
    pub fn logout(&self, id: &ConnectionId) {
        let conn = {
            let connections = self.connections.write();
            let Some(conn) = connections.get(id).cloned() else {
                warn!(conn = %id, "connection not found for logout");
                return;
            };
            conn.clear_auth(BASELINE_FEATURES);
            self.recompute_locked(&connections);
            conn
        };
        debug!(conn = %id, "connection logged out");
        self.notify_changed(&conn);
    }

    /// OR-reduce the feature bits of every connection in the table.
    ///
    /// Callers must hold the table lock so no insert can interleave between
    /// the fold and the store.
    fn recompute_locked(&self, connections: &HashMap<ConnectionId, Arc<ClientConnection>>) {
        let aggregate = connections
            .values()
            .fold(FeatureBits::NONE, |acc, conn| acc.union(conn.features()));
        self.active.set(aggregate);
    }

    fn notify_added(&self, conn: &ClientConnection) {
        if let Some(monitor) = self.monitor.get() {
            match serde_json::to_value(conn.snapshot()) {
                Ok(snapshot) => monitor.data_added(snapshot, None),
                Err(err) => warn!(error = %err, "failed to serialize connection snapshot"),
            }
        }
    }

    fn notify_changed(&self, conn: &ClientConnection) {
        if let Some(monitor) = self.monitor.get() {
            match serde_json::to_value(conn.snapshot()) {
                Ok(snapshot) => monitor.data_changed(snapshot, None),
                Err(err) => warn!(error = %err, "failed to serialize connection snapshot"),
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry is itself the provider for the client-monitor feature:
/// subscribers receive the live connection list (tokens redacted).
#[async_trait]
impl FeatureDataProvider for ConnectionRegistry {
    fn feature(&self) -> Feature {
        Feature::ClientMonitor
    }

    fn authorized_roles(&self) -> AuthorizedRoles {
        AuthorizedRoles::Roles(&[Role::Admin])
    }

    async fn init(&self) -> Result<(), FeatureError> {
        debug!("connection registry provider initialized");
        Ok(())
    }

    async fn initial_data(&self, _user: Option<&Auth>) -> Result<Vec<Value>, FeatureError> {
        self.snapshots()
            .into_iter()
            .map(|snapshot| {
                serde_json::to_value(snapshot)
                    .map_err(|err| FeatureError::Internal(err.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_conn(registry: &ConnectionRegistry, id: &str) -> Arc<ClientConnection> {
        registry.add(
            ConnectionId::from(id),
            "127.0.0.1:9000".into(),
            HeaderSnapshot::default(),
        )
    }

    fn aggregate_matches_or_reduction(registry: &ConnectionRegistry) -> bool {
        let expected = registry
            .all()
            .iter()
            .fold(FeatureBits::NONE, |acc, conn| acc.union(conn.features()));
        registry.active_features().get() == expected
    }

    #[test]
    fn add_and_get() {
        let registry = ConnectionRegistry::new();
        let _ = add_conn(&registry, "c1");
        assert!(registry.get(&ConnectionId::from("c1")).is_some());
        assert_eq!(registry.count(), 1);
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn remove_deletes_and_recomputes() {
        let registry = ConnectionRegistry::new();
        let _ = add_conn(&registry, "c1");
        registry.add_feature(&ConnectionId::from("c1"), Feature::Counter);
        assert!(registry.active_features().get().contains(Feature::Counter));

        registry.remove(&ConnectionId::from("c1"));
        assert_eq!(registry.count(), 0);
        assert!(registry.active_features().get().is_empty());
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn remove_nonexistent_is_safe() {
        let registry = ConnectionRegistry::new();
        registry.remove(&ConnectionId::from("ghost"));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn add_feature_updates_connection_and_aggregate() {
        let registry = ConnectionRegistry::new();
        let conn = add_conn(&registry, "c1");
        registry.add_feature(&conn.id, Feature::Counter);

        assert!(conn.features().contains(Feature::Counter));
        assert!(registry.active_features().get().contains(Feature::Counter));
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn add_feature_twice_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let conn = add_conn(&registry, "c1");
        registry.add_feature(&conn.id, Feature::Counter);
        let before = registry.active_features().get();
        registry.add_feature(&conn.id, Feature::Counter);

        assert_eq!(registry.active_features().get(), before);
        assert!(conn.features().contains(Feature::Counter));
    }

    #[test]
    fn add_feature_for_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add_feature(&ConnectionId::from("ghost"), Feature::Counter);
        assert!(registry.active_features().get().is_empty());
    }

    #[test]
    fn remove_feature_keeps_bit_held_by_other_connection() {
        let registry = ConnectionRegistry::new();
        let a = add_conn(&registry, "a");
        let b = add_conn(&registry, "b");
        registry.add_feature(&a.id, Feature::Counter);
        registry.add_feature(&b.id, Feature::Counter);

        registry.remove_feature(&a.id, Feature::Counter);

        assert!(!a.features().contains(Feature::Counter));
        assert!(b.features().contains(Feature::Counter));
        assert!(registry.active_features().get().contains(Feature::Counter));
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn remove_feature_clears_bit_when_last_holder() {
        let registry = ConnectionRegistry::new();
        let a = add_conn(&registry, "a");
        registry.add_feature(&a.id, Feature::Counter);
        registry.remove_feature(&a.id, Feature::Counter);

        assert!(!registry.active_features().get().contains(Feature::Counter));
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn remove_never_subscribed_feature_is_safe_noop() {
        let registry = ConnectionRegistry::new();
        let a = add_conn(&registry, "a");
        registry.remove_feature(&a.id, Feature::Counter);
        assert!(registry.active_features().get().is_empty());
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn disconnect_drops_bits_unique_to_that_connection() {
        let registry = ConnectionRegistry::new();
        let a = add_conn(&registry, "a");
        let b = add_conn(&registry, "b");
        registry.add_feature(&a.id, Feature::ClientMonitor);
        registry.add_feature(&a.id, Feature::Counter);
        registry.add_feature(&b.id, Feature::Counter);

        registry.remove(&a.id);

        let active = registry.active_features().get();
        assert!(!active.contains(Feature::ClientMonitor));
        assert!(active.contains(Feature::Counter));
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn set_auth_applies_identity_and_roles() {
        let registry = ConnectionRegistry::new();
        let conn = add_conn(&registry, "c1");
        let auth = Auth {
            id: 1,
            name: "alice".into(),
            roles: vec![Role::Admin],
        };
        let ok = registry.set_auth(
            &conn.id,
            Some(auth),
            TokenInfo {
                token: "tok".into(),
                valid: true,
                expiration: 9_999_999_999,
                reason: None,
            },
        );

        assert!(ok);
        assert_eq!(conn.user_name().as_deref(), Some("alice"));
        assert!(!conn.roles().is_empty());
    }

    #[test]
    fn set_auth_on_unknown_connection_is_false() {
        let registry = ConnectionRegistry::new();
        let ok = registry.set_auth(
            &ConnectionId::from("ghost"),
            None,
            TokenInfo::invalid("tok"),
        );
        assert!(!ok);
    }

    #[test]
    fn logout_resets_to_baseline_and_recomputes() {
        let registry = ConnectionRegistry::new();
        let conn = add_conn(&registry, "c1");
        let auth = Auth {
            id: 1,
            name: "alice".into(),
            roles: vec![Role::User],
        };
        let _ = registry.set_auth(
            &conn.id,
            Some(auth),
            TokenInfo {
                token: "tok".into(),
                valid: true,
                expiration: 9_999_999_999,
                reason: None,
            },
        );
        registry.add_feature(&conn.id, Feature::AppConfig);
        registry.add_feature(&conn.id, Feature::Counter);

        registry.logout(&conn.id);

        assert!(conn.auth().is_none());
        assert!(conn.token_info().is_none());
        assert_eq!(conn.features(), BASELINE_FEATURES);
        assert!(!registry.active_features().get().contains(Feature::Counter));
        assert!(registry.active_features().get().contains(Feature::AppConfig));
        assert!(aggregate_matches_or_reduction(&registry));
    }

    #[test]
    fn logout_unknown_connection_is_safe() {
        let registry = ConnectionRegistry::new();
        registry.logout(&ConnectionId::from("ghost"));
    }

    #[test]
    fn all_by_user_filters_on_auth_name() {
        let registry = ConnectionRegistry::new();
        let a = add_conn(&registry, "a");
        let _b = add_conn(&registry, "b");
        let auth = Auth {
            id: 1,
            name: "alice".into(),
            roles: vec![Role::User],
        };
        let _ = registry.set_auth(
            &a.id,
            Some(auth),
            TokenInfo {
                token: "tok".into(),
                valid: true,
                expiration: 9_999_999_999,
                reason: None,
            },
        );

        let found = registry.all_by_user("alice");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
        assert!(registry.all_by_user("bob").is_empty());
    }

    #[test]
    fn baseline_is_the_app_config_bit() {
        assert!(BASELINE_FEATURES.contains(Feature::AppConfig));
        assert!(!BASELINE_FEATURES.contains(Feature::Counter));
    }

    #[tokio::test]
    async fn provider_initial_data_is_redacted_snapshots() {
        let registry = ConnectionRegistry::new();
        let conn = add_conn(&registry, "c1");
        let _ = registry.set_auth(
            &conn.id,
            None,
            TokenInfo {
                token: "t".repeat(40),
                valid: false,
                expiration: 0,
                reason: Some("bad".into()),
            },
        );

        let data = registry.initial_data(None).await.unwrap();
        assert_eq!(data.len(), 1);
        let token = data[0]["tokenInfo"]["token"].as_str().unwrap();
        assert_eq!(token, "ttttt.....ttttt");
    }

    #[tokio::test]
    async fn provider_is_admin_only_client_monitor() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.feature(), Feature::ClientMonitor);
        assert_eq!(
            registry.authorized_roles(),
            AuthorizedRoles::Roles(&[Role::Admin])
        );
    }
}
