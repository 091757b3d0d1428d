//! Caller identity and the registry of currently connected users.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::User;
use crate::permission::{granted_type, Permission, PermissionType, ResourceScope};

/// A user together with the grants inherited from its groups.
///
/// Used both as the calling context of a service operation and as the
/// identity a live connection is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user: User,
    group_permissions: Vec<Permission>,
}

impl Session {
    pub fn new(user: User, group_permissions: Vec<Permission>) -> Self {
        Self {
            user,
            group_permissions,
        }
    }

    /// Session holding only the user's own grants.
    pub fn for_user(user: User) -> Self {
        Self::new(user, Vec::new())
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Own grants followed by group grants.
    pub fn grants(&self) -> impl Iterator<Item = &Permission> {
        self.user.permissions.iter().chain(self.group_permissions.iter())
    }

    /// Most privileged type this session holds on `target`.
    pub fn granted_at(&self, target: &ResourceScope) -> PermissionType {
        granted_type(self.grants(), target)
    }

    /// Replaces the user record after a user-update message. Group grants
    /// are left as they are; see [`Session::replace_group_permissions`].
    pub fn refresh_user(&mut self, user: User) {
        self.user = user;
    }

    pub fn replace_group_permissions(&mut self, group_permissions: Vec<Permission>) {
        self.group_permissions = group_permissions;
    }
}

/// Reference-counted set of users with at least one live connection.
///
/// The authorization gate reads it to decide whom a permission map must
/// cover; listeners register on subscribe and unregister when closed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: RwLock<HashMap<String, usize>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str) {
        if let Ok(mut connections) = self.connections.write() {
            *connections.entry(user_id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn unregister(&self, user_id: &str) {
        if let Ok(mut connections) = self.connections.write() {
            if let Some(count) = connections.get_mut(user_id) {
                *count -= 1;
                if *count == 0 {
                    connections.remove(user_id);
                }
            }
        }
    }

    /// Ids of users with at least one connection.
    pub fn connected_user_ids(&self) -> Vec<String> {
        match self.connections.read() {
            Ok(connections) => connections.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        match self.connections.read() {
            Ok(connections) => connections.get(user_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connection_count(user_id) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_merges_group_grants() {
        let user = User::new("dev@example.com").with_permission(Permission::pipeline("p1", PermissionType::Viewer));
        let session = Session::new(
            user,
            vec![Permission::pipeline_group("g1", PermissionType::Operator)],
        );

        assert_eq!(
            session.granted_at(&ResourceScope::pipeline("p1", "g1")),
            PermissionType::Operator
        );
        assert_eq!(
            session.granted_at(&ResourceScope::pipeline("p1", "")),
            PermissionType::Viewer
        );
        assert_eq!(session.granted_at(&ResourceScope::Server), PermissionType::None);
    }

    #[test]
    fn test_refresh_user_keeps_group_grants() {
        let user = User::new("dev@example.com");
        let mut session = Session::new(
            user.clone(),
            vec![Permission::server(PermissionType::Viewer)],
        );

        let promoted = user.with_permission(Permission::server(PermissionType::Admin));
        session.refresh_user(promoted);

        assert_eq!(session.granted_at(&ResourceScope::Server), PermissionType::Admin);
        assert_eq!(session.grants().count(), 2);
    }

    #[test]
    fn test_replace_group_permissions_drops_old_grants() {
        let mut session = Session::new(
            User::new("dev@example.com"),
            vec![Permission::server(PermissionType::Admin)],
        );
        session.replace_group_permissions(vec![Permission::pipeline_group("g1", PermissionType::Viewer)]);

        assert_eq!(session.granted_at(&ResourceScope::Server), PermissionType::None);
        assert_eq!(
            session.granted_at(&ResourceScope::pipeline("p1", "g1")),
            PermissionType::Viewer
        );
    }

    #[test]
    fn test_registry_counts_connections_per_user() {
        let registry = SessionRegistry::new();
        registry.register("u1");
        registry.register("u1");
        registry.register("u2");
        assert_eq!(registry.connection_count("u1"), 2);

        registry.unregister("u1");
        assert!(registry.is_connected("u1"));
        registry.unregister("u1");
        assert!(!registry.is_connected("u1"));

        let mut ids = registry.connected_user_ids();
        ids.sort();
        assert_eq!(ids, vec!["u2".to_string()]);
    }

    #[test]
    fn test_unregister_unknown_user_is_noop() {
        let registry = SessionRegistry::new();
        registry.unregister("ghost");
        assert!(registry.connected_user_ids().is_empty());
    }
}
