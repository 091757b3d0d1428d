//! Structured logging schema for ferrocd.
//!
//! Every crate tags its events with the same `subsystem` and `component`
//! values so log aggregation can filter one part of the notification path:
//!
//! ```text
//! tracing::debug!(subsystem = logging::NOTIFY, component = logging::LISTENER, ...)
//! ```
//!
//! ## Field names
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `subsystem` | one of the subsystem values below |
//! | `component` | one of the component values below |
//! | `op` | operation identifier, `Service.method` |
//! | `user_id` | user a call or connection is bound to |
//! | `listener_id` | connection identifier |
//! | `channel` | transport channel |
//! | `delivery` | one of the delivery values below |
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (publish failed, listener lagged) |
//! | INFO  | Lifecycle events (listener opened/closed, dispatcher started/stopped) |
//! | DEBUG | Decision points (gate allow/deny, deliver/drop) |
//! | TRACE | Per-message iteration |

// ─── Subsystems ────────────────────────────────────────────────────────────

/// Message dispatch, transport and listeners.
pub const NOTIFY: &str = "notify";

/// Authorization gate.
pub const AUTH: &str = "auth";

/// CRUD service tier.
pub const SERVICES: &str = "services";

/// HTTP / WebSocket surface.
pub const API: &str = "api";

// ─── Components ────────────────────────────────────────────────────────────

pub const DISPATCHER: &str = "dispatcher";
pub const LISTENER: &str = "listener";
pub const POOL: &str = "pool";
pub const GATE: &str = "gate";
pub const CASCADE: &str = "cascade";
pub const WEBSOCKET: &str = "websocket";

// ─── Delivery outcomes ─────────────────────────────────────────────────────

pub const DELIVERY_BROADCAST: &str = "broadcast";
pub const DELIVERY_OWNER: &str = "owner";
pub const DELIVERY_USER_UPDATE: &str = "user_update";
pub const DELIVERY_DROPPED: &str = "dropped";
