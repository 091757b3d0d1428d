//! Core traits for ferrocd collaborators.
//!
//! Persistence and the pub/sub transport are external to the notification
//! core; these traits are the seams concrete backends plug into.

use async_trait::async_trait;

use crate::envelope::{EntityKind, Payload};
use crate::error::Result;
use crate::models::{MaterialDefinition, Pipeline, PipelineDefinition, User, UserGroup};
use crate::permission::Permission;
use crate::transport::Subscription;

// =============================================================================
// ENTITIES
// =============================================================================

/// A durable record addressed by a string id.
pub trait Entity: Clone + Send + Sync + Into<Payload> + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

macro_rules! entity {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = EntityKind::$ty;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

entity!(PipelineDefinition, Pipeline, MaterialDefinition, User, UserGroup);

// =============================================================================
// REPOSITORY
// =============================================================================

/// Generic persistence collaborator.
///
/// Lookups report a missing record as `Ok(None)`; `update` and `delete` on a
/// missing id fail with [`Error::NotFound`](crate::Error::NotFound).
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Fetch one record by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Fetch every record.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Insert a new record.
    async fn add(&self, entity: T) -> Result<T>;

    /// Replace an existing record.
    async fn update(&self, entity: T) -> Result<T>;

    /// Remove a record, returning what was stored.
    async fn delete(&self, id: &str) -> Result<T>;
}

// =============================================================================
// GRANTS
// =============================================================================

/// Resolves the grants a user inherits from the groups it lists.
///
/// Live connections call this again whenever their user or one of its groups
/// changes, so it must read current state.
#[async_trait]
pub trait GrantResolver: Send + Sync {
    async fn group_permissions(&self, user: &User) -> Result<Vec<Permission>>;
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Pub/sub collaborator carrying encoded messages.
///
/// Only per-channel FIFO delivery to each subscriber is assumed; nothing is
/// retained for subscribers that join later.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `channel`. Returns the number of subscribers that
    /// were live at publish time.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;

    /// Open a new independent subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}
