//! Pipeline runs.
//!
//! A run is scoped by the definition it was created from. The definition is
//! looked up on every gated call, so a run follows its definition into a new
//! group and a run for a missing definition is rejected with
//! [`Error::NotFound`]. The group id stored on the run is overwritten with
//! the definition's on add and update.

use std::collections::HashMap;
use std::sync::Arc;

use ferrocd_db::{
    Database, Error, MessageDispatcher, Pipeline, PipelineDefinition, Repository, ResourceScope,
    Result, ServiceResult, Session,
};

use crate::authorization::{AuthorizationGate, Operation};
use crate::crud::CrudService;

fn pipeline_scope(pipeline: &Pipeline) -> ResourceScope {
    ResourceScope::pipeline(&pipeline.pipeline_definition_id, &pipeline.pipeline_group_id)
}

fn definition_scope(definition: &PipelineDefinition) -> ResourceScope {
    ResourceScope::pipeline(&definition.id, &definition.pipeline_group_id)
}

#[derive(Clone)]
pub struct PipelineService {
    crud: CrudService<Pipeline>,
    definitions: Arc<dyn Repository<PipelineDefinition>>,
}

impl PipelineService {
    pub fn new(db: &Database, gate: Arc<AuthorizationGate>, dispatcher: MessageDispatcher) -> Self {
        Self {
            crud: CrudService::new(db.pipelines.clone(), gate, dispatcher, pipeline_scope),
            definitions: db.pipeline_definitions.clone(),
        }
    }

    async fn definition_of(&self, pipeline: &Pipeline) -> Result<PipelineDefinition> {
        self.definitions
            .get_by_id(&pipeline.pipeline_definition_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "PipelineDefinition {} of Pipeline {}",
                    pipeline.pipeline_definition_id, pipeline.id
                ))
            })
    }

    /// Authorize `operation` on the run's definition and align the run's
    /// group with it.
    async fn authorize_run(&self, session: &Session, operation: Operation, pipeline: &mut Pipeline) -> Result<ResourceScope> {
        let definition = self.definition_of(pipeline).await?;
        let scope = definition_scope(&definition);
        self.crud.gate().authorize(session, operation, &scope)?;
        pipeline.pipeline_group_id = definition.pipeline_group_id;
        Ok(scope)
    }

    pub async fn get_by_id(&self, session: &Session, id: &str) -> Result<ServiceResult<Pipeline>> {
        let mut pipeline = self.crud.find(id).await?;
        self.authorize_run(session, Operation::PipelineGetById, &mut pipeline).await?;
        Ok(ServiceResult::success(pipeline, "Pipeline retrieved successfully."))
    }

    /// Every run the caller may view. Runs whose definition is gone are
    /// left out.
    pub async fn get_all(&self, session: &Session) -> Result<ServiceResult<Vec<Pipeline>>> {
        let operation = Operation::PipelineGetAll;
        self.crud.gate().authorize(session, operation, &ResourceScope::Server)?;

        let groups: HashMap<String, String> = self
            .definitions
            .get_all()
            .await?
            .into_iter()
            .map(|definition| (definition.id, definition.pipeline_group_id))
            .collect();

        let visible = self
            .crud
            .all_unfiltered()
            .await?
            .into_iter()
            .filter_map(|mut pipeline| {
                let group = groups.get(&pipeline.pipeline_definition_id)?;
                pipeline.pipeline_group_id = group.clone();
                self.crud
                    .gate()
                    .can_view(session, operation, &pipeline_scope(&pipeline))
                    .then_some(pipeline)
            })
            .collect::<Vec<_>>();
        Ok(ServiceResult::success(visible, "Pipelines retrieved successfully."))
    }

    pub async fn add(&self, session: &Session, mut pipeline: Pipeline) -> Result<ServiceResult<Pipeline>> {
        let operation = Operation::PipelineAdd;
        self.authorize_run(session, operation, &mut pipeline).await?;
        self.crud.persist_add(session, operation, pipeline).await
    }

    /// Replace a run. The caller needs the grant on the stored run's
    /// definition and, if the run is moved, on the new one.
    pub async fn update(&self, session: &Session, mut pipeline: Pipeline) -> Result<ServiceResult<Pipeline>> {
        let operation = Operation::PipelineUpdate;
        let mut stored = self.crud.find(&pipeline.id).await?;
        self.authorize_run(session, operation, &mut stored).await?;
        self.authorize_run(session, operation, &mut pipeline).await?;
        self.crud.persist_update(session, operation, pipeline).await
    }

    pub async fn delete(&self, session: &Session, id: &str) -> Result<ServiceResult<Pipeline>> {
        let operation = Operation::PipelineDelete;
        let mut stored = self.crud.find(id).await?;
        let scope = self.authorize_run(session, operation, &mut stored).await?;
        self.crud.persist_delete(session, operation, id, scope).await
    }

    /// Runs created from `pipeline_definition_id`, regardless of what the
    /// caller may view.
    pub(crate) async fn runs_of(&self, pipeline_definition_id: &str) -> Result<Vec<Pipeline>> {
        Ok(self
            .crud
            .all_unfiltered()
            .await?
            .into_iter()
            .filter(|pipeline| pipeline.pipeline_definition_id == pipeline_definition_id)
            .collect())
    }
}
