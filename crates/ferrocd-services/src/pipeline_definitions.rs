//! Pipeline definitions and the consistency rules of their stage/job/task
//! tree.
//!
//! ## Cascade rules
//!
//! - On add, every new definition receives a non-deletable `COUNT="1"`
//!   variable and every stage, job and task is stamped with the ids of all its
//!   ancestors. The walk completes before anything is persisted.
//! - On delete, every pipeline run created from the definition is deleted
//!   first. The first failing run aborts the delete and its error is
//!   returned; runs already deleted stay deleted.
//! - Unassigning from a group clears the group id and name to empty strings
//!   and goes through the regular update path, so it is announced like any
//!   other update.
//! - Assigning to a group, or updating a definition into another group,
//!   needs ADMIN at the destination as well.

use std::sync::Arc;

use ferrocd_db::{
    defaults, logging, Database, EnvironmentVariable, MaterialDefinition, MessageDispatcher,
    PipelineDefinition, ResourceScope, Result, ServiceResult, Session,
};
use tracing::{debug, warn};

use crate::authorization::{AuthorizationGate, Operation};
use crate::crud::CrudService;
use crate::materials::MaterialDefinitionService;
use crate::pipelines::PipelineService;

fn definition_scope(definition: &PipelineDefinition) -> ResourceScope {
    ResourceScope::pipeline(&definition.id, &definition.pipeline_group_id)
}

/// Seed the run counter and stamp ancestor ids through the whole tree.
pub fn prepare_for_add(definition: &mut PipelineDefinition) {
    definition
        .environment_variables
        .retain(|variable| variable.key != defaults::COUNT_VARIABLE_KEY);
    definition
        .environment_variables
        .push(EnvironmentVariable::run_counter());

    let pipeline_definition_id = definition.id.clone();
    for stage in &mut definition.stage_definitions {
        stage.pipeline_definition_id = pipeline_definition_id.clone();
        for job in &mut stage.job_definitions {
            job.pipeline_definition_id = pipeline_definition_id.clone();
            job.stage_definition_id = stage.id.clone();
            for task in &mut job.task_definitions {
                task.pipeline_definition_id = pipeline_definition_id.clone();
                task.stage_definition_id = stage.id.clone();
                task.job_definition_id = job.id.clone();
            }
        }
    }
}

#[derive(Clone)]
pub struct PipelineDefinitionService {
    crud: CrudService<PipelineDefinition>,
    pipelines: PipelineService,
    materials: MaterialDefinitionService,
}

impl PipelineDefinitionService {
    pub fn new(
        db: &Database,
        gate: Arc<AuthorizationGate>,
        dispatcher: MessageDispatcher,
        pipelines: PipelineService,
        materials: MaterialDefinitionService,
    ) -> Self {
        Self {
            crud: CrudService::new(db.pipeline_definitions.clone(), gate, dispatcher, definition_scope),
            pipelines,
            materials,
        }
    }

    pub async fn get_by_id(&self, session: &Session, id: &str) -> Result<ServiceResult<PipelineDefinition>> {
        self.crud
            .get_by_id(session, Operation::PipelineDefinitionGetById, id)
            .await
    }

    pub async fn get_all(&self, session: &Session) -> Result<ServiceResult<Vec<PipelineDefinition>>> {
        self.crud.get_all(session, Operation::PipelineDefinitionGetAll).await
    }

    /// Visible definitions with automatic scheduling enabled.
    pub async fn get_all_automatically_scheduled(
        &self,
        session: &Session,
    ) -> Result<ServiceResult<Vec<PipelineDefinition>>> {
        let all = self
            .crud
            .get_all(session, Operation::PipelineDefinitionGetAutoScheduled)
            .await?;
        let mut scheduled = all.map(|definitions| {
            definitions
                .into_iter()
                .filter(|definition| definition.is_auto_scheduling_enabled)
                .collect::<Vec<_>>()
        });
        scheduled.message = "PipelineDefinitions retrieved successfully.".to_string();
        Ok(scheduled)
    }

    pub async fn add(&self, session: &Session, definition: PipelineDefinition) -> Result<ServiceResult<PipelineDefinition>> {
        let operation = Operation::PipelineDefinitionAdd;
        self.crud
            .gate()
            .authorize(session, operation, &definition_scope(&definition))?;
        self.persist_new(session, operation, definition).await
    }

    /// Add a new material, then the definition building from it.
    ///
    /// A material that cannot be stored yields an error result and the
    /// definition is not added.
    pub async fn add_with_material(
        &self,
        session: &Session,
        mut definition: PipelineDefinition,
        material: MaterialDefinition,
    ) -> Result<ServiceResult<PipelineDefinition>> {
        let operation = Operation::PipelineDefinitionAddWithMaterial;
        self.crud
            .gate()
            .authorize(session, operation, &definition_scope(&definition))?;

        let material = match self.materials.add_unchecked(session, material).await {
            Ok(ServiceResult {
                entity: Some(material),
                ..
            }) => material,
            Ok(_) => return Ok(ServiceResult::error("PipelineDefinition could not be created.")),
            Err(e) => {
                warn!(
                    subsystem = logging::SERVICES,
                    op = %operation,
                    pipeline_definition_id = %definition.id,
                    error = %e,
                    "Material could not be created"
                );
                return Ok(ServiceResult::error("PipelineDefinition could not be created."));
            }
        };

        definition.material_definition_ids.push(material.id);
        self.persist_new(session, operation, definition).await
    }

    /// Add a definition building from an already stored material.
    pub async fn add_with_existing_material(
        &self,
        session: &Session,
        mut definition: PipelineDefinition,
        material_definition_id: &str,
    ) -> Result<ServiceResult<PipelineDefinition>> {
        let operation = Operation::PipelineDefinitionAddWithMaterial;
        self.crud
            .gate()
            .authorize(session, operation, &definition_scope(&definition))?;

        let material = self.materials.find(material_definition_id).await?;
        definition.material_definition_ids.push(material.id);
        self.persist_new(session, operation, definition).await
    }

    async fn persist_new(
        &self,
        session: &Session,
        operation: Operation,
        mut definition: PipelineDefinition,
    ) -> Result<ServiceResult<PipelineDefinition>> {
        prepare_for_add(&mut definition);
        debug!(
            subsystem = logging::SERVICES,
            component = logging::CASCADE,
            op = %operation,
            pipeline_definition_id = %definition.id,
            stages = definition.stage_definitions.len(),
            tasks = definition.tasks().count(),
            "Definition tree stamped"
        );
        self.crud.persist_add(session, operation, definition).await
    }

    pub async fn update(&self, session: &Session, definition: PipelineDefinition) -> Result<ServiceResult<PipelineDefinition>> {
        self.crud
            .update(session, Operation::PipelineDefinitionUpdate, definition)
            .await
    }

    /// Delete every run of the definition, then the definition itself.
    pub async fn delete(&self, session: &Session, id: &str) -> Result<ServiceResult<PipelineDefinition>> {
        let operation = Operation::PipelineDefinitionDelete;
        let definition = self.crud.find(id).await?;
        self.crud
            .gate()
            .authorize(session, operation, &definition_scope(&definition))?;

        let runs = self.pipelines.runs_of(id).await?;
        debug!(
            subsystem = logging::SERVICES,
            component = logging::CASCADE,
            op = %operation,
            pipeline_definition_id = id,
            runs = runs.len(),
            "Deleting dependent pipelines"
        );
        for run in runs {
            if let Err(e) = self.pipelines.delete(session, &run.id).await {
                warn!(
                    subsystem = logging::SERVICES,
                    component = logging::CASCADE,
                    op = %operation,
                    pipeline_definition_id = id,
                    pipeline_id = %run.id,
                    error = %e,
                    "Cascade aborted"
                );
                return Err(e);
            }
        }

        self.crud.delete(session, operation, id).await
    }

    pub async fn assign_to_group(
        &self,
        session: &Session,
        id: &str,
        pipeline_group_id: &str,
        group_name: &str,
    ) -> Result<ServiceResult<PipelineDefinition>> {
        self.regroup(
            session,
            Operation::PipelineDefinitionAssignToGroup,
            id,
            pipeline_group_id,
            group_name,
        )
        .await
    }

    pub async fn unassign_from_group(&self, session: &Session, id: &str) -> Result<ServiceResult<PipelineDefinition>> {
        self.regroup(session, Operation::PipelineDefinitionUnassignFromGroup, id, "", "")
            .await
    }

    async fn regroup(
        &self,
        session: &Session,
        operation: Operation,
        id: &str,
        pipeline_group_id: &str,
        group_name: &str,
    ) -> Result<ServiceResult<PipelineDefinition>> {
        let mut definition = self.crud.find(id).await?;
        self.crud
            .gate()
            .authorize(session, operation, &definition_scope(&definition))?;

        definition.pipeline_group_id = pipeline_group_id.to_string();
        definition.group_name = group_name.to_string();
        if operation == Operation::PipelineDefinitionAssignToGroup {
            self.crud
                .gate()
                .authorize(session, operation, &definition_scope(&definition))?;
        }
        self.crud.persist_update(session, operation, definition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocd_db::{JobDefinition, StageDefinition, TaskDefinition};

    #[test]
    fn test_prepare_stamps_every_level() {
        let mut definition = PipelineDefinition::new("deploy").with_stage(
            StageDefinition::new("build")
                .with_job(JobDefinition::new("compile").with_task(TaskDefinition::new("cargo"))),
        );
        prepare_for_add(&mut definition);

        let stage = &definition.stage_definitions[0];
        let job = &stage.job_definitions[0];
        let task = &job.task_definitions[0];
        assert_eq!(stage.pipeline_definition_id, definition.id);
        assert_eq!(job.pipeline_definition_id, definition.id);
        assert_eq!(job.stage_definition_id, stage.id);
        assert_eq!(task.pipeline_definition_id, definition.id);
        assert_eq!(task.stage_definition_id, stage.id);
        assert_eq!(task.job_definition_id, job.id);
    }

    #[test]
    fn test_prepare_seeds_single_count() {
        let mut definition = PipelineDefinition::new("deploy");
        definition
            .environment_variables
            .push(EnvironmentVariable::new("COUNT", "42"));
        prepare_for_add(&mut definition);

        let counts: Vec<_> = definition
            .environment_variables
            .iter()
            .filter(|v| v.key == "COUNT")
            .collect();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].value, "1");
        assert!(!counts[0].is_deletable);
    }

    #[test]
    fn test_prepare_keeps_other_variables() {
        let mut definition = PipelineDefinition::new("deploy");
        definition
            .environment_variables
            .push(EnvironmentVariable::new("REGION", "eu-west-1"));
        prepare_for_add(&mut definition);
        assert_eq!(definition.environment_variables.len(), 2);
        assert_eq!(definition.environment_variables[0].key, "REGION");
    }
}
