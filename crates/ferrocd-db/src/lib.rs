//! # ferrocd-db
//!
//! Repository backends for ferrocd.
//!
//! This crate provides:
//! - A generic in-memory [`Repository`] for every core entity
//! - The [`Database`] bundle handed to the service tier
//! - Failure-injecting wrappers for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferrocd_db::{Database, PipelineDefinition};
//!
//! let db = Database::in_memory();
//! let definition = db.pipeline_definitions.add(PipelineDefinition::new("deploy")).await?;
//! ```

pub mod memory;

// Test fixtures for integration tests
// Note: Always compiled so integration tests in other crates can use them
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use ferrocd_core::*;

pub use memory::MemoryRepository;

/// Combined repository context shared by all services.
#[derive(Clone)]
pub struct Database {
    /// Pipeline definitions (stage/job/task trees).
    pub pipeline_definitions: Arc<dyn Repository<PipelineDefinition>>,
    /// Pipeline instances created from definitions.
    pub pipelines: Arc<dyn Repository<Pipeline>>,
    /// Material definitions (source repositories).
    pub materials: Arc<dyn Repository<MaterialDefinition>>,
    pub users: Arc<dyn Repository<User>>,
    pub user_groups: Arc<dyn Repository<UserGroup>>,
}

impl Database {
    /// Database with a fresh in-memory repository per entity.
    pub fn in_memory() -> Self {
        Self {
            pipeline_definitions: Arc::new(MemoryRepository::new()),
            pipelines: Arc::new(MemoryRepository::new()),
            materials: Arc::new(MemoryRepository::new()),
            users: Arc::new(MemoryRepository::new()),
            user_groups: Arc::new(MemoryRepository::new()),
        }
    }

    pub fn with_pipeline_definitions(mut self, repo: Arc<dyn Repository<PipelineDefinition>>) -> Self {
        self.pipeline_definitions = repo;
        self
    }

    pub fn with_pipelines(mut self, repo: Arc<dyn Repository<Pipeline>>) -> Self {
        self.pipelines = repo;
        self
    }

    pub fn with_materials(mut self, repo: Arc<dyn Repository<MaterialDefinition>>) -> Self {
        self.materials = repo;
        self
    }

    pub fn with_users(mut self, repo: Arc<dyn Repository<User>>) -> Self {
        self.users = repo;
        self
    }

    pub fn with_user_groups(mut self, repo: Arc<dyn Repository<UserGroup>>) -> Self {
        self.user_groups = repo;
        self
    }
}
