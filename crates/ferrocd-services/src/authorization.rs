//! Authorization gate and the operation requirement table.
//!
//! Every public service operation is listed in [`Operation`] together with the
//! `(scope, type)` a caller must hold and the type a connection needs to see
//! the resulting broadcast. Services call [`AuthorizationGate::authorize`]
//! before touching the repository, and build their outgoing message with
//! [`AuthorizationGate::authorized_message`] after a successful mutation.
//!
//! ## Requirement Table
//!
//! | Operation | Scope | Type | Result visible at |
//! |-----------|-------|------|-------------------|
//! | PipelineDefinition get by id | PIPELINE | VIEWER | VIEWER |
//! | PipelineDefinition get all / auto-scheduled | PIPELINE | NONE | VIEWER |
//! | PipelineDefinition add (+ material) | PIPELINE_GROUP | ADMIN | VIEWER |
//! | PipelineDefinition update / delete / (un)assign group | PIPELINE | ADMIN | VIEWER |
//! | Pipeline get by id | PIPELINE | VIEWER | VIEWER |
//! | Pipeline get all | PIPELINE | NONE | VIEWER |
//! | Pipeline add / update | PIPELINE | OPERATOR | VIEWER |
//! | Pipeline delete | PIPELINE | ADMIN | VIEWER |
//! | MaterialDefinition get by id / get all | SERVER | NONE | NONE |
//! | MaterialDefinition add / update / delete | SERVER | ADMIN | NONE |
//! | User * | SERVER | ADMIN | ADMIN (the updated user: NONE) |
//! | UserGroup get by id | SERVER | ADMIN | NONE |
//! | UserGroup get all / with members | SERVER | NONE | NONE |
//! | UserGroup add / update / delete / (un)assign user | SERVER | ADMIN | NONE |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ferrocd_db::{
    logging, Database, Error, GrantResolver, Message, Payload, Permission, PermissionScope,
    PermissionType, Repository, Requirement, ResourceScope, Result, ServiceResult, Session,
    SessionRegistry, User, UserGroup,
};
use tracing::debug;

use PermissionScope::{Pipeline as PIPELINE, PipelineGroup as PIPELINE_GROUP, Server as SERVER};
use PermissionType::{Admin as ADMIN, None as NONE, Operator as OPERATOR, Viewer as VIEWER};

/// Every gated service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PipelineDefinitionGetById,
    PipelineDefinitionGetAll,
    PipelineDefinitionGetAutoScheduled,
    PipelineDefinitionAdd,
    PipelineDefinitionAddWithMaterial,
    PipelineDefinitionUpdate,
    PipelineDefinitionDelete,
    PipelineDefinitionAssignToGroup,
    PipelineDefinitionUnassignFromGroup,
    PipelineGetById,
    PipelineGetAll,
    PipelineAdd,
    PipelineUpdate,
    PipelineDelete,
    MaterialDefinitionGetById,
    MaterialDefinitionGetAll,
    MaterialDefinitionAdd,
    MaterialDefinitionUpdate,
    MaterialDefinitionDelete,
    UserGetById,
    UserGetAll,
    UserAdd,
    UserUpdate,
    UserDelete,
    UserGroupGetById,
    UserGroupGetAll,
    UserGroupGetAllWithMembers,
    UserGroupAdd,
    UserGroupUpdate,
    UserGroupDelete,
    UserGroupAssignUser,
    UserGroupUnassignUser,
}

impl Operation {
    /// Name of the service exposing this operation.
    pub fn service(&self) -> &'static str {
        use Operation::*;
        match self {
            PipelineDefinitionGetById
            | PipelineDefinitionGetAll
            | PipelineDefinitionGetAutoScheduled
            | PipelineDefinitionAdd
            | PipelineDefinitionAddWithMaterial
            | PipelineDefinitionUpdate
            | PipelineDefinitionDelete
            | PipelineDefinitionAssignToGroup
            | PipelineDefinitionUnassignFromGroup => "PipelineDefinitionService",
            PipelineGetById | PipelineGetAll | PipelineAdd | PipelineUpdate | PipelineDelete => {
                "PipelineService"
            }
            MaterialDefinitionGetById
            | MaterialDefinitionGetAll
            | MaterialDefinitionAdd
            | MaterialDefinitionUpdate
            | MaterialDefinitionDelete => "MaterialDefinitionService",
            UserGetById | UserGetAll | UserAdd | UserUpdate | UserDelete => "UserService",
            UserGroupGetById
            | UserGroupGetAll
            | UserGroupGetAllWithMembers
            | UserGroupAdd
            | UserGroupUpdate
            | UserGroupDelete
            | UserGroupAssignUser
            | UserGroupUnassignUser => "UserGroupService",
        }
    }

    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        use Operation::*;
        match self {
            PipelineDefinitionGetById | PipelineGetById | MaterialDefinitionGetById | UserGetById
            | UserGroupGetById => "getById",
            PipelineDefinitionGetAll | PipelineGetAll | MaterialDefinitionGetAll | UserGetAll
            | UserGroupGetAll => "getAll",
            PipelineDefinitionGetAutoScheduled => "getAllAutomaticallyScheduledPipelines",
            PipelineDefinitionAdd | PipelineAdd | MaterialDefinitionAdd | UserAdd | UserGroupAdd => {
                "add"
            }
            PipelineDefinitionAddWithMaterial => "addWithMaterialDefinition",
            PipelineDefinitionUpdate | PipelineUpdate | MaterialDefinitionUpdate | UserUpdate
            | UserGroupUpdate => "update",
            PipelineDefinitionDelete | PipelineDelete | MaterialDefinitionDelete | UserDelete
            | UserGroupDelete => "delete",
            PipelineDefinitionAssignToGroup => "assignPipelineToGroup",
            PipelineDefinitionUnassignFromGroup => "unassignPipelineFromGroup",
            UserGroupGetAllWithMembers => "getAllUserGroups",
            UserGroupAssignUser => "assignUserToGroup",
            UserGroupUnassignUser => "unassignUserFromGroup",
        }
    }

    /// Module that implements the operation.
    pub fn package(&self) -> &'static str {
        match self.service() {
            "PipelineDefinitionService" => "ferrocd_services::pipeline_definitions",
            "PipelineService" => "ferrocd_services::pipelines",
            "MaterialDefinitionService" => "ferrocd_services::materials",
            "UserService" => "ferrocd_services::users",
            _ => "ferrocd_services::user_groups",
        }
    }

    /// What the caller must hold.
    pub fn requirement(&self) -> Requirement {
        use Operation::*;
        let (scope, permission_type) = match self {
            PipelineDefinitionGetById => (PIPELINE, VIEWER),
            PipelineDefinitionGetAll | PipelineDefinitionGetAutoScheduled => (PIPELINE, NONE),
            PipelineDefinitionAdd | PipelineDefinitionAddWithMaterial => (PIPELINE_GROUP, ADMIN),
            PipelineDefinitionUpdate
            | PipelineDefinitionDelete
            | PipelineDefinitionAssignToGroup
            | PipelineDefinitionUnassignFromGroup => (PIPELINE, ADMIN),
            PipelineGetById => (PIPELINE, VIEWER),
            PipelineGetAll => (PIPELINE, NONE),
            PipelineAdd | PipelineUpdate => (PIPELINE, OPERATOR),
            PipelineDelete => (PIPELINE, ADMIN),
            MaterialDefinitionGetById | MaterialDefinitionGetAll => (SERVER, NONE),
            MaterialDefinitionAdd | MaterialDefinitionUpdate | MaterialDefinitionDelete => {
                (SERVER, ADMIN)
            }
            UserGetById | UserGetAll | UserAdd | UserUpdate | UserDelete => (SERVER, ADMIN),
            UserGroupGetById => (SERVER, ADMIN),
            UserGroupGetAll | UserGroupGetAllWithMembers => (SERVER, NONE),
            UserGroupAdd | UserGroupUpdate | UserGroupDelete | UserGroupAssignUser
            | UserGroupUnassignUser => (SERVER, ADMIN),
        };
        Requirement::new(scope, permission_type)
    }

    /// Type a connection needs at the result's scope to see the result.
    pub fn visibility(&self) -> PermissionType {
        match self.service() {
            "PipelineDefinitionService" | "PipelineService" => VIEWER,
            "UserService" => ADMIN,
            _ => NONE,
        }
    }

    /// Results of this operation make receivers refresh their identity.
    pub fn is_user_update(&self) -> bool {
        matches!(self, Operation::UserUpdate)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service(), self.method())
    }
}

/// Decides whether calls may proceed and who may see their results.
pub struct AuthorizationGate {
    users: Arc<dyn Repository<User>>,
    user_groups: Arc<dyn Repository<UserGroup>>,
    registry: Arc<SessionRegistry>,
}

impl AuthorizationGate {
    pub fn new(db: &Database, registry: Arc<SessionRegistry>) -> Self {
        Self {
            users: db.users.clone(),
            user_groups: db.user_groups.clone(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolve `user_id` into a session carrying its own and its groups'
    /// grants. Groups that no longer exist are skipped.
    pub async fn open_session(&self, user_id: &str) -> Result<Session> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User {}", user_id)))?;

        if !user.is_enabled {
            return Err(Error::NotAuthorized {
                operation: "Session.open".to_string(),
                scope: SERVER,
                required: NONE,
            });
        }

        let group_permissions = self.group_permissions(&user).await?;
        Ok(Session::new(user, group_permissions))
    }

    /// Returns `true` if `session` may perform `operation` on `target`.
    pub fn permits(&self, session: &Session, operation: Operation, target: &ResourceScope) -> bool {
        operation.requirement().is_satisfied_by(session.grants(), target)
    }

    /// Fails with [`Error::NotAuthorized`] unless `session` may perform
    /// `operation` on `target`.
    pub fn authorize(&self, session: &Session, operation: Operation, target: &ResourceScope) -> Result<()> {
        let requirement = operation.requirement();
        let allowed = self.permits(session, operation, target);
        debug!(
            subsystem = logging::AUTH,
            component = logging::GATE,
            op = %operation,
            user_id = %session.user_id(),
            required = ?requirement.permission_type,
            scope = ?requirement.scope,
            allowed,
            "Authorization decision"
        );
        if allowed {
            Ok(())
        } else {
            Err(Error::NotAuthorized {
                operation: operation.to_string(),
                scope: requirement.scope,
                required: requirement.permission_type,
            })
        }
    }

    /// Returns `true` if `session` may see a result of `operation` at `scope`.
    pub fn can_view(&self, session: &Session, operation: Operation, scope: &ResourceScope) -> bool {
        session.granted_at(scope).satisfies(operation.visibility())
    }

    /// Build the message announcing `result` and stamp it for every
    /// connected user.
    pub fn authorized_message<T>(
        &self,
        session: &Session,
        operation: Operation,
        result: &ServiceResult<T>,
        scope: ResourceScope,
    ) -> Message
    where
        T: Clone + Into<Payload>,
    {
        let mut message = Message::from_result(operation.service(), operation.method(), result, session.user())
            .with_package_name(operation.package())
            .with_scope(scope, operation.visibility())
            .with_user_update(operation.is_user_update());

        let stamps = self.permission_map(operation, &message);
        message.stamp_permissions(stamps);
        message
    }

    fn permission_map(&self, operation: Operation, message: &Message) -> HashMap<String, PermissionType> {
        let visibility = operation.visibility();
        let updated_user = if message.is_user_update {
            message.envelope.get().as_user().map(|user| user.id.as_str())
        } else {
            None
        };

        self.registry
            .connected_user_ids()
            .into_iter()
            .map(|user_id| {
                let required = if updated_user == Some(user_id.as_str()) {
                    NONE
                } else {
                    visibility
                };
                (user_id, required)
            })
            .collect()
    }
}

#[async_trait]
impl GrantResolver for AuthorizationGate {
    /// Grants of every group `user` lists. Groups that no longer exist are
    /// skipped.
    async fn group_permissions(&self, user: &User) -> Result<Vec<Permission>> {
        let mut group_permissions = Vec::new();
        for group_id in &user.user_group_ids {
            if let Some(group) = self.user_groups.get_by_id(group_id).await? {
                group_permissions.extend(group.permissions);
            }
        }
        Ok(group_permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocd_db::PipelineDefinition;

    fn gate() -> (Database, AuthorizationGate) {
        let db = Database::in_memory();
        let gate = AuthorizationGate::new(&db, Arc::new(SessionRegistry::new()));
        (db, gate)
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(
            Operation::PipelineDefinitionAdd.requirement(),
            Requirement::new(PIPELINE_GROUP, ADMIN)
        );
        assert_eq!(Operation::PipelineAdd.requirement(), Requirement::new(PIPELINE, OPERATOR));
        assert_eq!(Operation::UserGroupGetById.requirement(), Requirement::new(SERVER, ADMIN));
        assert_eq!(Operation::UserGroupGetAll.requirement(), Requirement::new(SERVER, NONE));
        assert_eq!(Operation::PipelineDefinitionUpdate.to_string(), "PipelineDefinitionService.update");
    }

    #[test]
    fn test_authorize_group_admin_may_add_to_group() {
        let (_db, gate) = gate();
        let session = Session::for_user(
            User::new("lead@example.com").with_permission(Permission::pipeline_group("g1", ADMIN)),
        );
        let in_group = ResourceScope::pipeline("new", "g1");
        let elsewhere = ResourceScope::pipeline("new", "g2");

        assert!(gate.authorize(&session, Operation::PipelineDefinitionAdd, &in_group).is_ok());
        let err = gate
            .authorize(&session, Operation::PipelineDefinitionAdd, &elsewhere)
            .unwrap_err();
        assert!(err.is_not_authorized());
    }

    #[test]
    fn test_none_requirement_always_passes() {
        let (_db, gate) = gate();
        let nobody = Session::for_user(User::new("nobody@example.com"));
        assert!(gate
            .authorize(&nobody, Operation::UserGroupGetAll, &ResourceScope::Server)
            .is_ok());
    }

    #[tokio::test]
    async fn test_open_session_collects_group_grants() {
        let (db, gate) = gate();
        let group = db
            .user_groups
            .add(UserGroup::new("ops").with_permission(Permission::server(OPERATOR)))
            .await
            .unwrap();
        let mut user = User::new("dev@example.com");
        user.user_group_ids = vec![group.id.clone(), "deleted-group".to_string()];
        let user = db.users.add(user).await.unwrap();

        let session = gate.open_session(&user.id).await.unwrap();
        assert_eq!(session.granted_at(&ResourceScope::Server), OPERATOR);
    }

    #[tokio::test]
    async fn test_open_session_rejects_unknown_and_disabled_users() {
        let (db, gate) = gate();
        assert!(matches!(gate.open_session("ghost").await, Err(Error::NotFound(_))));

        let mut disabled = User::new("gone@example.com");
        disabled.is_enabled = false;
        let disabled = db.users.add(disabled).await.unwrap();
        assert!(gate.open_session(&disabled.id).await.unwrap_err().is_not_authorized());
    }

    #[test]
    fn test_message_stamped_for_connected_users() {
        let (_db, gate) = gate();
        gate.registry().register("u1");
        gate.registry().register("u2");

        let caller = Session::for_user(User::new("admin@example.com"));
        let definition = PipelineDefinition::new("deploy");
        let scope = ResourceScope::pipeline(&definition.id, "");
        let result = ServiceResult::success(definition, "PipelineDefinition created successfully.");

        let message = gate.authorized_message(&caller, Operation::PipelineDefinitionAdd, &result, scope);
        assert_eq!(message.permission_type_for("u1"), Some(VIEWER));
        assert_eq!(message.permission_type_for("u2"), Some(VIEWER));
        assert_eq!(message.permission_type_for("offline"), None);
        assert_eq!(message.package_name.as_deref(), Some("ferrocd_services::pipeline_definitions"));
    }

    #[test]
    fn test_user_update_stamps_none_for_updated_user() {
        let (_db, gate) = gate();
        let updated = User::new("dev@example.com");
        gate.registry().register(&updated.id);
        gate.registry().register("other");

        let caller = Session::for_user(User::new("admin@example.com"));
        let result = ServiceResult::success(updated.clone(), "User updated successfully.");
        let message = gate.authorized_message(&caller, Operation::UserUpdate, &result, ResourceScope::Server);

        assert!(message.is_user_update);
        assert_eq!(message.permission_type_for(&updated.id), Some(NONE));
        assert_eq!(message.permission_type_for("other"), Some(ADMIN));
    }

    #[test]
    fn test_globally_visible_results_stamp_none() {
        let (_db, gate) = gate();
        gate.registry().register("u1");
        let caller = Session::for_user(User::new("admin@example.com"));
        let result = ServiceResult::success(UserGroup::new("ops"), "UserGroup created successfully.");
        let message = gate.authorized_message(&caller, Operation::UserGroupAdd, &result, ResourceScope::Server);
        assert_eq!(message.permission_type_for("u1"), Some(NONE));
    }
}
