//! Generic gated CRUD over one repository.
//!
//! Each method checks the caller against the operation's requirement at the
//! entity's scope before touching storage. Mutations publish exactly one
//! message through the dispatcher once the repository call has succeeded;
//! failures are returned and never published.

use std::sync::Arc;

use ferrocd_db::{
    logging, Entity, Error, MessageDispatcher, Repository, ResourceScope, Result, ServiceResult,
    Session,
};
use tracing::debug;

use crate::authorization::{AuthorizationGate, Operation};

/// Resolves the resource an entity belongs to.
pub type ScopeOf<T> = fn(&T) -> ResourceScope;

pub struct CrudService<T: Entity> {
    repository: Arc<dyn Repository<T>>,
    gate: Arc<AuthorizationGate>,
    dispatcher: MessageDispatcher,
    scope_of: ScopeOf<T>,
}

impl<T: Entity> Clone for CrudService<T> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            gate: self.gate.clone(),
            dispatcher: self.dispatcher.clone(),
            scope_of: self.scope_of,
        }
    }
}

impl<T: Entity> CrudService<T> {
    pub fn new(
        repository: Arc<dyn Repository<T>>,
        gate: Arc<AuthorizationGate>,
        dispatcher: MessageDispatcher,
        scope_of: ScopeOf<T>,
    ) -> Self {
        Self {
            repository,
            gate,
            dispatcher,
            scope_of,
        }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn scope_of(&self, entity: &T) -> ResourceScope {
        (self.scope_of)(entity)
    }

    /// Fetch a record or fail with [`Error::NotFound`].
    pub async fn find(&self, id: &str) -> Result<T> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::KIND, id)))
    }

    /// Every stored record, without visibility filtering.
    pub(crate) async fn all_unfiltered(&self) -> Result<Vec<T>> {
        self.repository.get_all().await
    }

    pub async fn get_by_id(&self, session: &Session, operation: Operation, id: &str) -> Result<ServiceResult<T>> {
        let entity = self.find(id).await?;
        self.gate.authorize(session, operation, &self.scope_of(&entity))?;
        Ok(ServiceResult::success(entity, format!("{} retrieved successfully.", T::KIND)))
    }

    /// Every record the caller may view.
    pub async fn get_all(&self, session: &Session, operation: Operation) -> Result<ServiceResult<Vec<T>>> {
        self.gate.authorize(session, operation, &ResourceScope::Server)?;
        let visible: Vec<T> = self
            .repository
            .get_all()
            .await?
            .into_iter()
            .filter(|entity| self.gate.can_view(session, operation, &self.scope_of(entity)))
            .collect();
        Ok(ServiceResult::success(visible, format!("{}s retrieved successfully.", T::KIND)))
    }

    pub async fn add(&self, session: &Session, operation: Operation, entity: T) -> Result<ServiceResult<T>> {
        self.gate.authorize(session, operation, &self.scope_of(&entity))?;
        self.persist_add(session, operation, entity).await
    }

    /// Insert without a gate check, for operations that already authorized
    /// the caller.
    pub(crate) async fn persist_add(&self, session: &Session, operation: Operation, entity: T) -> Result<ServiceResult<T>> {
        let added = self.repository.add(entity).await?;
        let scope = self.scope_of(&added);
        let result = ServiceResult::success(added, format!("{} created successfully.", T::KIND));
        self.publish(session, operation, &result, scope);
        Ok(result)
    }

    /// Replace a stored record. The caller is checked against the stored
    /// record's scope, and against the new one when the update moves the
    /// record; the message is published at the new scope.
    pub async fn update(&self, session: &Session, operation: Operation, entity: T) -> Result<ServiceResult<T>> {
        let stored = self.find(entity.id()).await?;
        let from = self.scope_of(&stored);
        let to = self.scope_of(&entity);
        self.gate.authorize(session, operation, &from)?;
        if to != from {
            self.gate.authorize(session, operation, &to)?;
        }
        self.persist_update(session, operation, entity).await
    }

    /// Update without a gate check, for operations that already authorized
    /// the caller.
    pub(crate) async fn persist_update(
        &self,
        session: &Session,
        operation: Operation,
        entity: T,
    ) -> Result<ServiceResult<T>> {
        let updated = self.repository.update(entity).await?;
        let scope = self.scope_of(&updated);
        let result = ServiceResult::success(updated, format!("{} updated successfully.", T::KIND));
        self.publish(session, operation, &result, scope);
        Ok(result)
    }

    pub async fn delete(&self, session: &Session, operation: Operation, id: &str) -> Result<ServiceResult<T>> {
        let stored = self.find(id).await?;
        let scope = self.scope_of(&stored);
        self.gate.authorize(session, operation, &scope)?;
        self.persist_delete(session, operation, id, scope).await
    }

    /// Delete without a gate check, announcing the result at `scope`.
    pub(crate) async fn persist_delete(
        &self,
        session: &Session,
        operation: Operation,
        id: &str,
        scope: ResourceScope,
    ) -> Result<ServiceResult<T>> {
        let deleted = self.repository.delete(id).await?;
        let result = ServiceResult::success(deleted, format!("{} deleted successfully.", T::KIND));
        self.publish(session, operation, &result, scope);
        Ok(result)
    }

    /// Stamp and dispatch the message announcing `result`.
    pub fn publish<R>(&self, session: &Session, operation: Operation, result: &ServiceResult<R>, scope: ResourceScope)
    where
        R: Clone + Into<ferrocd_db::Payload>,
    {
        let message = self.gate.authorized_message(session, operation, result, scope);
        debug!(
            subsystem = logging::SERVICES,
            op = %operation,
            user_id = %session.user_id(),
            message_id = %message.message_id,
            recipients = message.permission_type_by_user().len(),
            "Publishing result"
        );
        self.dispatcher.dispatch(message);
    }
}
