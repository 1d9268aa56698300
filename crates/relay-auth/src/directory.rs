//! User-directory collaborator contract.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use relay_core::{Auth, Role};

/// Resolves a claimed username to a live identity.
///
/// Backed by whatever user store the embedding application uses; token
/// claims alone are not trusted to still reflect reality (the user may have
/// been deleted or had roles changed since the token was issued).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by login name. `None` means unknown or disabled.
    async fn validate_user(&self, username: &str) -> Option<Auth>;
}

/// In-memory directory for sandboxes and tests.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashMap<String, Auth>>,
}

impl StaticUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, assigning the next free id.
    pub fn insert(&self, name: &str, roles: Vec<Role>) {
        let mut users = self.users.write();
        let id = users.len() as i64 + 1;
        let _ = users.insert(
            name.to_owned(),
            Auth {
                id,
                name: name.to_owned(),
                roles,
            },
        );
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Whether the directory has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn validate_user(&self, username: &str) -> Option<Auth> {
        self.users.read().get(username).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_known_user() {
        let dir = StaticUserDirectory::new();
        dir.insert("alice", vec![Role::Admin]);

        let auth = dir.validate_user("alice").await.unwrap();
        assert_eq!(auth.name, "alice");
        assert_eq!(auth.roles, vec![Role::Admin]);
    }

    #[tokio::test]
    async fn lookup_unknown_user_is_none() {
        let dir = StaticUserDirectory::new();
        assert!(dir.validate_user("nobody").await.is_none());
    }

    #[tokio::test]
    async fn ids_are_assigned_sequentially() {
        let dir = StaticUserDirectory::new();
        dir.insert("a", vec![Role::User]);
        dir.insert("b", vec![Role::User]);

        assert_eq!(dir.validate_user("a").await.unwrap().id, 1);
        assert_eq!(dir.validate_user("b").await.unwrap().id, 2);
        assert_eq!(dir.len(), 2);
    }
}
