//! Process-local repository backed by a locked map.

use std::collections::HashMap;

use async_trait::async_trait;
use ferrocd_core::{Entity, Error, Repository, Result};
use tokio::sync::RwLock;
use tracing::debug;

struct Records<T> {
    by_id: HashMap<String, T>,
    // Insertion order, so get_all is stable.
    order: Vec<String>,
}

/// In-memory [`Repository`] for any [`Entity`].
pub struct MemoryRepository<T: Entity> {
    records: RwLock<Records<T>>,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records {
                by_id: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Repository pre-filled with `entities`.
    pub fn with_records(entities: impl IntoIterator<Item = T>) -> Self {
        let mut by_id = HashMap::new();
        let mut order = Vec::new();
        for entity in entities {
            let id = entity.id().to_string();
            if by_id.insert(id.clone(), entity).is_none() {
                order.push(id);
            }
        }
        Self {
            records: RwLock::new(Records { by_id, order }),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for MemoryRepository<T> {
    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.read().await.by_id.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        let records = self.records.read().await;
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }

    async fn add(&self, entity: T) -> Result<T> {
        let mut records = self.records.write().await;
        let id = entity.id().to_string();
        if records.by_id.contains_key(&id) {
            return Err(Error::Conflict(format!("{} {} already exists", T::KIND, id)));
        }
        records.by_id.insert(id.clone(), entity.clone());
        records.order.push(id.clone());
        debug!(kind = %T::KIND, id = %id, "Record added");
        Ok(entity)
    }

    async fn update(&self, entity: T) -> Result<T> {
        let mut records = self.records.write().await;
        let Some(slot) = records.by_id.get_mut(entity.id()) else {
            return Err(Error::NotFound(format!("{} {}", T::KIND, entity.id())));
        };
        *slot = entity.clone();
        debug!(kind = %T::KIND, id = %entity.id(), "Record updated");
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> Result<T> {
        let mut records = self.records.write().await;
        let removed = records
            .by_id
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::KIND, id)))?;
        records.order.retain(|existing| existing != id);
        debug!(kind = %T::KIND, id, "Record deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocd_core::{PipelineDefinition, User};

    #[tokio::test]
    async fn test_add_then_get() {
        let repo = MemoryRepository::new();
        let definition = repo.add(PipelineDefinition::new("deploy")).await.unwrap();

        let fetched = repo.get_by_id(&definition.id).await.unwrap();
        assert_eq!(fetched, Some(definition));
        assert_eq!(repo.get_by_id("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_duplicate_id_conflicts() {
        let repo = MemoryRepository::new();
        let user = repo.add(User::new("a@example.com")).await.unwrap();
        assert!(matches!(repo.add(user).await, Err(Error::Conflict(_))));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_are_not_found() {
        let repo: MemoryRepository<User> = MemoryRepository::new();
        let ghost = User::new("ghost@example.com");
        assert!(matches!(repo.update(ghost.clone()).await, Err(Error::NotFound(_))));
        assert!(matches!(repo.delete(&ghost.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_all_keeps_insertion_order() {
        let a = PipelineDefinition::new("a");
        let b = PipelineDefinition::new("b");
        let c = PipelineDefinition::new("c");
        let repo = MemoryRepository::with_records([a.clone(), b.clone(), c.clone()]);

        repo.delete(&b.id).await.unwrap();
        let names: Vec<_> = repo.get_all().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let repo = MemoryRepository::new();
        let mut definition = repo.add(PipelineDefinition::new("deploy")).await.unwrap();
        definition.name = "release".to_string();
        repo.update(definition.clone()).await.unwrap();
        assert_eq!(
            repo.get_by_id(&definition.id).await.unwrap().map(|d| d.name),
            Some("release".to_string())
        );
    }
}
