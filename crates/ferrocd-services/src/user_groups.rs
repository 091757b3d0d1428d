//! User groups and group membership.
//!
//! Membership is stored on both sides: the user lists its group ids and the
//! group lists its user ids. Assigning expects the caller to have added the
//! group to the user already, while the group does not list the user yet;
//! unassigning expects the opposite. Any other combination means the two
//! sides disagree and the call fails with [`Error::Conflict`].

use std::sync::Arc;

use ferrocd_db::{
    Database, Error, MessageDispatcher, ResourceScope, Result, ServiceResult, Session, User,
    UserGroup, UserGroupMembers,
};
use futures::future::try_join_all;

use crate::authorization::{AuthorizationGate, Operation};
use crate::crud::CrudService;
use crate::users::UserService;

fn user_group_scope(_: &UserGroup) -> ResourceScope {
    ResourceScope::Server
}

#[derive(Clone)]
pub struct UserGroupService {
    crud: CrudService<UserGroup>,
    users: UserService,
}

impl UserGroupService {
    pub fn new(
        db: &Database,
        gate: Arc<AuthorizationGate>,
        dispatcher: MessageDispatcher,
        users: UserService,
    ) -> Self {
        Self {
            crud: CrudService::new(db.user_groups.clone(), gate, dispatcher, user_group_scope),
            users,
        }
    }

    pub async fn get_by_id(&self, session: &Session, id: &str) -> Result<ServiceResult<UserGroup>> {
        self.crud.get_by_id(session, Operation::UserGroupGetById, id).await
    }

    pub async fn get_all(&self, session: &Session) -> Result<ServiceResult<Vec<UserGroup>>> {
        self.crud.get_all(session, Operation::UserGroupGetAll).await
    }

    /// Every group with its member records resolved. Members whose record
    /// no longer exists are left out.
    pub async fn get_all_with_members(&self, session: &Session) -> Result<ServiceResult<Vec<UserGroupMembers>>> {
        let groups = self
            .crud
            .get_all(session, Operation::UserGroupGetAllWithMembers)
            .await?
            .entity
            .unwrap_or_default();

        let resolved = try_join_all(groups.into_iter().map(|group| self.with_members(group))).await?;
        Ok(ServiceResult::success(resolved, "UserGroups retrieved successfully."))
    }

    pub async fn add(&self, session: &Session, user_group: UserGroup) -> Result<ServiceResult<UserGroup>> {
        self.crud.add(session, Operation::UserGroupAdd, user_group).await
    }

    pub async fn update(&self, session: &Session, user_group: UserGroup) -> Result<ServiceResult<UserGroup>> {
        self.crud.update(session, Operation::UserGroupUpdate, user_group).await
    }

    /// Delete an empty group. A group with members is left untouched.
    pub async fn delete(&self, session: &Session, id: &str) -> Result<ServiceResult<UserGroup>> {
        let operation = Operation::UserGroupDelete;
        let group = self.crud.find(id).await?;
        self.crud.gate().authorize(session, operation, &ResourceScope::Server)?;

        if !group.user_ids.is_empty() {
            return Err(Error::Conflict(format!(
                "UserGroup {} has {} users assigned to it",
                group.name,
                group.user_ids.len()
            )));
        }

        self.crud.delete(session, operation, id).await
    }

    /// Add `user` to the group's member list and persist both sides.
    pub async fn assign_user(
        &self,
        session: &Session,
        user: User,
        user_group_id: &str,
    ) -> Result<ServiceResult<UserGroupMembers>> {
        let operation = Operation::UserGroupAssignUser;
        let mut group = self.crud.find(user_group_id).await?;
        self.crud.gate().authorize(session, operation, &ResourceScope::Server)?;

        let may_assign = user.references_group(&group.id) && !group.references_user(&user.id);
        if !may_assign {
            return Err(Error::Conflict(format!(
                "User {} already assigned to UserGroup {}",
                user.email, group.name
            )));
        }

        group.user_ids.push(user.id.clone());
        self.save_membership(session, operation, user, group).await
    }

    /// Remove `user` from the group's member list and persist both sides.
    pub async fn unassign_user(
        &self,
        session: &Session,
        user: User,
        user_group_id: &str,
    ) -> Result<ServiceResult<UserGroupMembers>> {
        let operation = Operation::UserGroupUnassignUser;
        let mut group = self.crud.find(user_group_id).await?;
        self.crud.gate().authorize(session, operation, &ResourceScope::Server)?;

        let may_unassign = !user.references_group(&group.id) && group.references_user(&user.id);
        if !may_unassign {
            return Err(Error::Conflict(format!(
                "User {} already unassigned from UserGroup {}",
                user.email, group.name
            )));
        }

        group.user_ids.retain(|id| id != &user.id);
        self.save_membership(session, operation, user, group).await
    }

    /// The group is stored first so a failure there leaves both sides
    /// untouched. A failure storing the user is returned after the group
    /// update has been announced; nothing is rolled back.
    async fn save_membership(
        &self,
        session: &Session,
        operation: Operation,
        user: User,
        group: UserGroup,
    ) -> Result<ServiceResult<UserGroupMembers>> {
        let updated = self
            .crud
            .persist_update(session, operation, group)
            .await?
            .entity
            .ok_or_else(|| Error::Internal("update returned no UserGroup".to_string()))?;
        self.users.update_unchecked(session, user).await?;

        let members = self.with_members(updated).await?;
        Ok(ServiceResult::success(members, "UserGroup updated successfully."))
    }

    async fn with_members(&self, group: UserGroup) -> Result<UserGroupMembers> {
        let mut users = Vec::with_capacity(group.user_ids.len());
        for user_id in &group.user_ids {
            match self.users.find(user_id).await {
                Ok(user) => users.push(user),
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(UserGroupMembers { group, users })
    }
}
