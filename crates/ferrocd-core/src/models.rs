//! Durable entities managed through the repository collaborator.
//!
//! The notification core never owns storage; it only guards transitions of
//! these records and carries them inside envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::permission::Permission;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// PIPELINE DEFINITION TREE
// =============================================================================

/// A key/value variable exposed to pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    pub id: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub is_secured: bool,
    #[serde(default = "default_true")]
    pub is_deletable: bool,
}

fn default_true() -> bool {
    true
}

impl EnvironmentVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            key: key.into(),
            value: value.into(),
            is_secured: false,
            is_deletable: true,
        }
    }

    /// The run counter seeded on every new pipeline definition.
    pub fn run_counter() -> Self {
        Self {
            is_deletable: false,
            ..Self::new(defaults::COUNT_VARIABLE_KEY, defaults::COUNT_VARIABLE_VALUE)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub pipeline_definition_id: String,
    #[serde(default)]
    pub stage_definition_id: String,
    #[serde(default)]
    pub job_definition_id: String,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            pipeline_definition_id: String::new(),
            stage_definition_id: String::new(),
            job_definition_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub pipeline_definition_id: String,
    #[serde(default)]
    pub stage_definition_id: String,
    #[serde(default)]
    pub task_definitions: Vec<TaskDefinition>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            pipeline_definition_id: String::new(),
            stage_definition_id: String::new(),
            task_definitions: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.task_definitions.push(task);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub pipeline_definition_id: String,
    #[serde(default)]
    pub job_definitions: Vec<JobDefinition>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            pipeline_definition_id: String::new(),
            job_definitions: Vec::new(),
        }
    }

    pub fn with_job(mut self, job: JobDefinition) -> Self {
        self.job_definitions.push(job);
        self
    }
}

/// Template describing the stage/job/task structure of a pipeline.
///
/// An empty `pipeline_group_id` means the definition is not assigned to a
/// group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub pipeline_group_id: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub stage_definitions: Vec<StageDefinition>,
    #[serde(default)]
    pub material_definition_ids: Vec<String>,
    #[serde(default)]
    pub is_auto_scheduling_enabled: bool,
    pub modified_date: DateTime<Utc>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            pipeline_group_id: String::new(),
            group_name: String::new(),
            environment_variables: Vec::new(),
            stage_definitions: Vec::new(),
            material_definition_ids: Vec::new(),
            is_auto_scheduling_enabled: false,
            modified_date: Utc::now(),
        }
    }

    pub fn in_group(mut self, pipeline_group_id: impl Into<String>, group_name: impl Into<String>) -> Self {
        self.pipeline_group_id = pipeline_group_id.into();
        self.group_name = group_name.into();
        self
    }

    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stage_definitions.push(stage);
        self
    }

    /// Iterates every task in the tree, stage by stage.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.stage_definitions
            .iter()
            .flat_map(|stage| stage.job_definitions.iter())
            .flat_map(|job| job.task_definitions.iter())
    }
}

// =============================================================================
// PIPELINE RUNS & MATERIALS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Scheduled,
    InProgress,
    Passed,
    Failed,
    Canceled,
}

/// A run of a pipeline definition. Depends on its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub pipeline_definition_id: String,
    #[serde(default)]
    pub pipeline_definition_name: String,
    /// Copy of the definition's group, refreshed whenever the run is stored
    /// through the pipeline service.
    #[serde(default)]
    pub pipeline_group_id: String,
    pub execution_id: u64,
    pub status: PipelineStatus,
    pub triggered_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(definition: &PipelineDefinition, execution_id: u64) -> Self {
        Self {
            id: new_id(),
            pipeline_definition_id: definition.id.clone(),
            pipeline_definition_name: definition.name.clone(),
            pipeline_group_id: definition.pipeline_group_id.clone(),
            execution_id,
            status: PipelineStatus::Scheduled,
            triggered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialType {
    Git,
}

/// Source a pipeline definition builds from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialDefinition {
    pub id: String,
    pub name: String,
    pub material_type: MaterialType,
    pub repository_url: String,
    #[serde(default)]
    pub branch: String,
}

impl MaterialDefinition {
    pub fn git(name: impl Into<String>, repository_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            material_type: MaterialType::Git,
            repository_url: repository_url.into(),
            branch: branch.into(),
        }
    }
}

// =============================================================================
// USERS & GROUPS
// =============================================================================

/// An account. `user_group_ids` is this side of the membership relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub user_group_ids: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            email: email.into(),
            user_group_ids: Vec::new(),
            permissions: Vec::new(),
            is_enabled: true,
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn references_group(&self, user_group_id: &str) -> bool {
        self.user_group_ids.iter().any(|id| id == user_group_id)
    }
}

/// A set of users sharing permission assignments. `user_ids` is the group
/// side of the membership relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl UserGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            user_ids: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn references_user(&self, user_id: &str) -> bool {
        self.user_ids.iter().any(|id| id == user_id)
    }
}

/// A user group together with its resolved member records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupMembers {
    #[serde(flatten)]
    pub group: UserGroup,
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_counter_is_not_deletable() {
        let count = EnvironmentVariable::run_counter();
        assert_eq!(count.key, "COUNT");
        assert_eq!(count.value, "1");
        assert!(!count.is_deletable);
    }

    #[test]
    fn test_environment_variable_deletable_by_default_on_wire() {
        let json = r#"{"id":"e1","key":"A","value":"b"}"#;
        let var: EnvironmentVariable = serde_json::from_str(json).unwrap();
        assert!(var.is_deletable);
        assert!(!var.is_secured);
    }

    #[test]
    fn test_pipeline_definition_tasks_iterates_whole_tree() {
        let definition = PipelineDefinition::new("build")
            .with_stage(
                StageDefinition::new("s1")
                    .with_job(JobDefinition::new("j1").with_task(TaskDefinition::new("t1")))
                    .with_job(JobDefinition::new("j2").with_task(TaskDefinition::new("t2"))),
            )
            .with_stage(
                StageDefinition::new("s2")
                    .with_job(JobDefinition::new("j3").with_task(TaskDefinition::new("t3"))),
            );

        let names: Vec<&str> = definition.tasks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_membership_lookups() {
        let mut user = User::new("dev@example.com");
        let mut group = UserGroup::new("developers");
        assert!(!user.references_group(&group.id));
        assert!(!group.references_user(&user.id));

        user.user_group_ids.push(group.id.clone());
        group.user_ids.push(user.id.clone());
        assert!(user.references_group(&group.id));
        assert!(group.references_user(&user.id));
    }

    #[test]
    fn test_user_group_members_flattens_group() {
        let group = UserGroup::new("ops");
        let members = UserGroupMembers {
            group: group.clone(),
            users: vec![],
        };
        let json = serde_json::to_value(&members).unwrap();
        assert_eq!(json["name"], "ops");
        assert_eq!(json["id"], group.id.as_str());
        assert!(json["users"].as_array().unwrap().is_empty());
    }
}
