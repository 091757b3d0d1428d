//! User accounts.
//!
//! Updating a user announces a user-update message: the updated user's own
//! connections always receive it and refresh their session, everyone else
//! needs ADMIN at SERVER.

use std::sync::Arc;

use ferrocd_db::{Database, MessageDispatcher, ResourceScope, Result, ServiceResult, Session, User};

use crate::authorization::{AuthorizationGate, Operation};
use crate::crud::CrudService;

fn user_scope(_: &User) -> ResourceScope {
    ResourceScope::Server
}

#[derive(Clone)]
pub struct UserService {
    crud: CrudService<User>,
}

impl UserService {
    pub fn new(db: &Database, gate: Arc<AuthorizationGate>, dispatcher: MessageDispatcher) -> Self {
        Self {
            crud: CrudService::new(db.users.clone(), gate, dispatcher, user_scope),
        }
    }

    pub async fn get_by_id(&self, session: &Session, id: &str) -> Result<ServiceResult<User>> {
        self.crud.get_by_id(session, Operation::UserGetById, id).await
    }

    pub async fn get_all(&self, session: &Session) -> Result<ServiceResult<Vec<User>>> {
        self.crud.get_all(session, Operation::UserGetAll).await
    }

    pub async fn add(&self, session: &Session, user: User) -> Result<ServiceResult<User>> {
        self.crud.add(session, Operation::UserAdd, user).await
    }

    pub async fn update(&self, session: &Session, user: User) -> Result<ServiceResult<User>> {
        self.crud.update(session, Operation::UserUpdate, user).await
    }

    pub async fn delete(&self, session: &Session, id: &str) -> Result<ServiceResult<User>> {
        self.crud.delete(session, Operation::UserDelete, id).await
    }

    /// Persist membership changes made by another operation that has already
    /// authorized the caller.
    pub(crate) async fn update_unchecked(&self, session: &Session, user: User) -> Result<ServiceResult<User>> {
        self.crud.persist_update(session, Operation::UserUpdate, user).await
    }

    pub(crate) async fn find(&self, id: &str) -> Result<User> {
        self.crud.find(id).await
    }
}
