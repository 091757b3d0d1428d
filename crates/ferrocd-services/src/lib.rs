//! # ferrocd-services
//!
//! Authorization-gated CRUD services for ferrocd.
//!
//! This crate provides:
//! - The operation requirement table and the authorization gate
//! - A generic gated CRUD base
//! - Pipeline definition, pipeline, material, user and user group services
//!
//! Every mutation that succeeds is announced through the injected
//! [`MessageDispatcher`]; failed calls return an error and announce nothing.
//!
//! ## Example
//!
//! ```ignore
//! use ferrocd_services::{Services, Database, MessageDispatcher, BroadcastTransport};
//!
//! let (dispatcher, _handle) = MessageDispatcher::start(transport, "ferrocd.messages");
//! let services = Services::new(&Database::in_memory(), dispatcher, registry);
//!
//! let session = services.gate.open_session(&user_id).await?;
//! let result = services.pipeline_definitions.add(&session, definition).await?;
//! ```

pub mod authorization;
pub mod crud;
pub mod materials;
pub mod pipeline_definitions;
pub mod pipelines;
pub mod user_groups;
pub mod users;

use std::sync::Arc;

// Re-export core types
pub use ferrocd_db::*;

pub use authorization::{AuthorizationGate, Operation};
pub use crud::CrudService;
pub use materials::MaterialDefinitionService;
pub use pipeline_definitions::{prepare_for_add, PipelineDefinitionService};
pub use pipelines::PipelineService;
pub use user_groups::UserGroupService;
pub use users::UserService;

/// Every service, wired to one gate and one dispatcher.
#[derive(Clone)]
pub struct Services {
    pub gate: Arc<AuthorizationGate>,
    pub pipeline_definitions: PipelineDefinitionService,
    pub pipelines: PipelineService,
    pub materials: MaterialDefinitionService,
    pub users: UserService,
    pub user_groups: UserGroupService,
}

impl Services {
    pub fn new(db: &Database, dispatcher: MessageDispatcher, registry: Arc<SessionRegistry>) -> Self {
        let gate = Arc::new(AuthorizationGate::new(db, registry));
        let pipelines = PipelineService::new(db, gate.clone(), dispatcher.clone());
        let materials = MaterialDefinitionService::new(db, gate.clone(), dispatcher.clone());
        let users = UserService::new(db, gate.clone(), dispatcher.clone());
        let pipeline_definitions = PipelineDefinitionService::new(
            db,
            gate.clone(),
            dispatcher.clone(),
            pipelines.clone(),
            materials.clone(),
        );
        let user_groups = UserGroupService::new(db, gate.clone(), dispatcher, users.clone());

        Self {
            gate,
            pipeline_definitions,
            pipelines,
            materials,
            users,
            user_groups,
        }
    }
}
