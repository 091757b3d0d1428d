//! Material definitions (source repositories pipelines build from).

use std::sync::Arc;

use ferrocd_db::{
    Database, MaterialDefinition, MessageDispatcher, ResourceScope, Result, ServiceResult, Session,
};

use crate::authorization::{AuthorizationGate, Operation};
use crate::crud::CrudService;

fn material_scope(_: &MaterialDefinition) -> ResourceScope {
    ResourceScope::Server
}

#[derive(Clone)]
pub struct MaterialDefinitionService {
    crud: CrudService<MaterialDefinition>,
}

impl MaterialDefinitionService {
    pub fn new(db: &Database, gate: Arc<AuthorizationGate>, dispatcher: MessageDispatcher) -> Self {
        Self {
            crud: CrudService::new(db.materials.clone(), gate, dispatcher, material_scope),
        }
    }

    pub async fn get_by_id(&self, session: &Session, id: &str) -> Result<ServiceResult<MaterialDefinition>> {
        self.crud
            .get_by_id(session, Operation::MaterialDefinitionGetById, id)
            .await
    }

    pub async fn get_all(&self, session: &Session) -> Result<ServiceResult<Vec<MaterialDefinition>>> {
        self.crud.get_all(session, Operation::MaterialDefinitionGetAll).await
    }

    pub async fn add(&self, session: &Session, material: MaterialDefinition) -> Result<ServiceResult<MaterialDefinition>> {
        self.crud.add(session, Operation::MaterialDefinitionAdd, material).await
    }

    pub async fn update(
        &self,
        session: &Session,
        material: MaterialDefinition,
    ) -> Result<ServiceResult<MaterialDefinition>> {
        self.crud
            .update(session, Operation::MaterialDefinitionUpdate, material)
            .await
    }

    pub async fn delete(&self, session: &Session, id: &str) -> Result<ServiceResult<MaterialDefinition>> {
        self.crud
            .delete(session, Operation::MaterialDefinitionDelete, id)
            .await
    }

    /// Store a material on behalf of an operation that has already
    /// authorized the caller.
    pub(crate) async fn add_unchecked(
        &self,
        session: &Session,
        material: MaterialDefinition,
    ) -> Result<ServiceResult<MaterialDefinition>> {
        self.crud
            .persist_add(session, Operation::MaterialDefinitionAdd, material)
            .await
    }

    pub(crate) async fn find(&self, id: &str) -> Result<MaterialDefinition> {
        self.crud.find(id).await
    }
}
