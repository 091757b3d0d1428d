//! Test fixtures for service-level tests.
//!
//! Always compiled so integration tests in other crates can build failure
//! scenarios without a real backend.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ferrocd_db::{test_fixtures::FaultyRepository, Database, MemoryRepository};
//!
//! let pipelines = Arc::new(MemoryRepository::new());
//! let db = Database::in_memory()
//!     .with_pipelines(Arc::new(FaultyRepository::new(pipelines).failing_delete(&stuck.id)));
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ferrocd_core::{Entity, Error, Repository, Result};

/// Wraps a repository and injects failures for chosen operations.
pub struct FaultyRepository<T: Entity> {
    inner: Arc<dyn Repository<T>>,
    failing_deletes: HashSet<String>,
    failing_updates: HashSet<String>,
    fail_adds: bool,
}

impl<T: Entity> FaultyRepository<T> {
    pub fn new(inner: Arc<dyn Repository<T>>) -> Self {
        Self {
            inner,
            failing_deletes: HashSet::new(),
            failing_updates: HashSet::new(),
            fail_adds: false,
        }
    }

    /// Make `delete(id)` fail for this id.
    pub fn failing_delete(mut self, id: &str) -> Self {
        self.failing_deletes.insert(id.to_string());
        self
    }

    /// Make `update` fail for the record with this id.
    pub fn failing_update(mut self, id: &str) -> Self {
        self.failing_updates.insert(id.to_string());
        self
    }

    /// Make every `add` fail.
    pub fn failing_adds(mut self) -> Self {
        self.fail_adds = true;
        self
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for FaultyRepository<T> {
    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        self.inner.get_by_id(id).await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        self.inner.get_all().await
    }

    async fn add(&self, entity: T) -> Result<T> {
        if self.fail_adds {
            return Err(Error::Internal(format!("injected failure adding {} {}", T::KIND, entity.id())));
        }
        self.inner.add(entity).await
    }

    async fn update(&self, entity: T) -> Result<T> {
        if self.failing_updates.contains(entity.id()) {
            return Err(Error::Internal(format!("injected failure updating {} {}", T::KIND, entity.id())));
        }
        self.inner.update(entity).await
    }

    async fn delete(&self, id: &str) -> Result<T> {
        if self.failing_deletes.contains(id) {
            return Err(Error::Internal(format!("injected failure deleting {} {}", T::KIND, id)));
        }
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRepository;
    use ferrocd_core::MaterialDefinition;

    #[tokio::test]
    async fn test_injected_delete_failure_leaves_record() {
        let material = MaterialDefinition::git("repo", "https://example.com/repo.git", "main");
        let inner = Arc::new(MemoryRepository::with_records([material.clone()]));
        let faulty = FaultyRepository::new(inner.clone()).failing_delete(&material.id);

        assert!(matches!(faulty.delete(&material.id).await, Err(Error::Internal(_))));
        assert!(inner.get_by_id(&material.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_adds() {
        let inner: Arc<MemoryRepository<MaterialDefinition>> = Arc::new(MemoryRepository::new());
        let faulty = FaultyRepository::new(inner.clone()).failing_adds();
        let material = MaterialDefinition::git("repo", "https://example.com/repo.git", "main");
        assert!(faulty.add(material).await.is_err());
        assert!(inner.is_empty().await);
    }
}
