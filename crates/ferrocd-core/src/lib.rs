//! # ferrocd-core
//!
//! Core types, traits, and the change-notification machinery for ferrocd.
//!
//! This crate provides the domain model, the permission model, the
//! [`Message`]/[`Envelope`] notification unit and the runtime pieces that move
//! messages from services to live connections: [`MessageDispatcher`],
//! [`SubscriptionPool`] and [`Listener`].

pub mod config;
pub mod defaults;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod logging;
pub mod message;
pub mod models;
pub mod permission;
pub mod pool;
pub mod session;
pub mod traits;
pub mod transport;

// Re-export commonly used types at crate root
pub use config::NotifyConfig;
pub use dispatcher::{DispatchStats, DispatcherHandle, MessageDispatcher};
pub use envelope::{EntityKind, Envelope, Payload};
pub use error::{Error, Result};
pub use listener::{should_deliver, Delivery, Listener, ListenerHandle, ListenerState};
pub use message::{DeliveryClass, Message, NotificationType, ServiceResult};
pub use models::*;
pub use permission::{granted_type, Permission, PermissionScope, PermissionType, Requirement, ResourceScope};
pub use pool::{PooledSubscription, SubscriptionPool};
pub use session::{Session, SessionRegistry};
pub use traits::*;
pub use transport::{BroadcastTransport, Subscription, SubscriptionError};
