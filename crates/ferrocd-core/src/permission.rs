//! Permission model: ordered permission types, hierarchical scopes, and grants.
//!
//! A requirement `(S, T)` is satisfied by a grant `(S', T')` when `S'` covers
//! `S` and `T'` is at least as privileged as `T`. [`PermissionType::None`] is
//! the unrestricted requirement and is satisfied by everyone, including callers
//! without any grant.
//!
//! ```text
//! SERVER ⊇ PIPELINE_GROUP ⊇ PIPELINE
//! ADMIN  >  OPERATOR  >  VIEWER  >  NONE
//! ```

use serde::{Deserialize, Serialize};

/// Privilege level of a grant or requirement.
///
/// Variants are declared weakest first so the derived `Ord` matches privilege.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    #[default]
    None,
    Viewer,
    Operator,
    Admin,
}

impl PermissionType {
    /// Returns `true` if a grant of `self` meets `required`.
    pub fn satisfies(self, required: PermissionType) -> bool {
        required == PermissionType::None || self >= required
    }
}

/// Hierarchical boundary over which access is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionScope {
    Server,
    PipelineGroup,
    Pipeline,
}

impl PermissionScope {
    fn breadth(self) -> u8 {
        match self {
            PermissionScope::Server => 2,
            PermissionScope::PipelineGroup => 1,
            PermissionScope::Pipeline => 0,
        }
    }

    /// Returns `true` if `self` is as broad as or broader than `other`.
    pub fn covers(self, other: PermissionScope) -> bool {
        self.breadth() >= other.breadth()
    }
}

/// The concrete resource an operation or message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceScope {
    Server,
    #[serde(rename_all = "camelCase")]
    PipelineGroup { pipeline_group_id: String },
    #[serde(rename_all = "camelCase")]
    Pipeline {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pipeline_group_id: Option<String>,
        pipeline_definition_id: String,
    },
}

impl ResourceScope {
    /// Scope of a pipeline definition, remembering its enclosing group.
    ///
    /// An empty group id means the definition is unassigned.
    pub fn pipeline(pipeline_definition_id: &str, pipeline_group_id: &str) -> Self {
        ResourceScope::Pipeline {
            pipeline_group_id: non_empty(pipeline_group_id),
            pipeline_definition_id: pipeline_definition_id.to_string(),
        }
    }

    /// Scope of a pipeline group. An empty id falls back to the server scope.
    pub fn pipeline_group(pipeline_group_id: &str) -> Self {
        match non_empty(pipeline_group_id) {
            Some(id) => ResourceScope::PipelineGroup {
                pipeline_group_id: id,
            },
            None => ResourceScope::Server,
        }
    }

    /// The permission scope this resource lives at.
    pub fn scope(&self) -> PermissionScope {
        match self {
            ResourceScope::Server => PermissionScope::Server,
            ResourceScope::PipelineGroup { .. } => PermissionScope::PipelineGroup,
            ResourceScope::Pipeline { .. } => PermissionScope::Pipeline,
        }
    }

    /// The nearest enclosing resource at `scope`.
    ///
    /// Narrowing is impossible, so asking a group for its pipeline returns the
    /// group itself. A pipeline outside any group is enclosed by the server.
    pub fn enclosing(&self, scope: PermissionScope) -> ResourceScope {
        match (self, scope) {
            (_, PermissionScope::Server) => ResourceScope::Server,
            (
                ResourceScope::Pipeline {
                    pipeline_group_id, ..
                },
                PermissionScope::PipelineGroup,
            ) => match pipeline_group_id {
                Some(id) => ResourceScope::PipelineGroup {
                    pipeline_group_id: id.clone(),
                },
                None => ResourceScope::Server,
            },
            _ => self.clone(),
        }
    }
}

fn non_empty(id: &str) -> Option<String> {
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// A permission assignment held by a user or a user group.
///
/// `entity_id` names the pipeline group or pipeline definition the grant is
/// bound to; `None` grants the type on every entity at that scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub permission_scope: PermissionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub permission_type: PermissionType,
}

impl Permission {
    /// Server-wide grant.
    pub fn server(permission_type: PermissionType) -> Self {
        Self {
            permission_scope: PermissionScope::Server,
            entity_id: None,
            permission_type,
        }
    }

    /// Grant on one pipeline group and every pipeline inside it.
    pub fn pipeline_group(pipeline_group_id: impl Into<String>, permission_type: PermissionType) -> Self {
        Self {
            permission_scope: PermissionScope::PipelineGroup,
            entity_id: Some(pipeline_group_id.into()),
            permission_type,
        }
    }

    /// Grant on a single pipeline definition.
    pub fn pipeline(pipeline_definition_id: impl Into<String>, permission_type: PermissionType) -> Self {
        Self {
            permission_scope: PermissionScope::Pipeline,
            entity_id: Some(pipeline_definition_id.into()),
            permission_type,
        }
    }

    /// Returns `true` if this grant applies to `target`.
    pub fn covers(&self, target: &ResourceScope) -> bool {
        if !self.permission_scope.covers(target.scope()) {
            return false;
        }
        let Some(entity_id) = self.entity_id.as_deref() else {
            return true;
        };
        match (self.permission_scope, target) {
            (PermissionScope::Server, _) => true,
            (
                PermissionScope::PipelineGroup,
                ResourceScope::PipelineGroup { pipeline_group_id },
            ) => pipeline_group_id == entity_id,
            (
                PermissionScope::PipelineGroup,
                ResourceScope::Pipeline {
                    pipeline_group_id, ..
                },
            ) => pipeline_group_id.as_deref() == Some(entity_id),
            (
                PermissionScope::Pipeline,
                ResourceScope::Pipeline {
                    pipeline_definition_id,
                    ..
                },
            ) => pipeline_definition_id == entity_id,
            _ => false,
        }
    }
}

/// The most privileged type any of `grants` provides on `target`.
pub fn granted_type<'a, I>(grants: I, target: &ResourceScope) -> PermissionType
where
    I: IntoIterator<Item = &'a Permission>,
{
    grants
        .into_iter()
        .filter(|grant| grant.covers(target))
        .map(|grant| grant.permission_type)
        .max()
        .unwrap_or(PermissionType::None)
}

/// The `(scope, minimum type)` an operation declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub scope: PermissionScope,
    pub permission_type: PermissionType,
}

impl Requirement {
    pub const fn new(scope: PermissionScope, permission_type: PermissionType) -> Self {
        Self {
            scope,
            permission_type,
        }
    }

    /// Evaluates `grants` against this requirement for the resource `target`.
    ///
    /// The grant is resolved at the nearest resource enclosing `target` at the
    /// requirement's scope.
    pub fn is_satisfied_by<'a, I>(&self, grants: I, target: &ResourceScope) -> bool
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        if self.permission_type == PermissionType::None {
            return true;
        }
        let resource = target.enclosing(self.scope);
        granted_type(grants, &resource).satisfies(self.permission_type)
    }
}
