//! Centralized default constants for the ferrocd system.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types read their fallbacks from here instead of defining
//! their own magic numbers.

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Well-known transport channel every message is published on.
pub const NOTIFY_CHANNEL: &str = "ferrocd.messages";

/// Per-channel broadcast buffer. Slow listeners lagging further than this
/// skip ahead and miss messages.
pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;

/// Maximum number of concurrently checked-out transport subscriptions.
pub const NOTIFY_POOL_SIZE: usize = 1024;

/// How long a new connection waits for a free subscription.
pub const NOTIFY_CHECKOUT_TIMEOUT_MS: u64 = 5_000;

/// Per-connection buffer between a listener and its socket writer.
pub const NOTIFY_OUTBOUND_BUFFER: usize = 64;

// =============================================================================
// PIPELINE DEFINITIONS
// =============================================================================

/// Key of the run counter seeded on every new pipeline definition.
pub const COUNT_VARIABLE_KEY: &str = "COUNT";

/// Initial value of the run counter.
pub const COUNT_VARIABLE_VALUE: &str = "1";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8080;

/// Interval between WebSocket keep-alive pings.
pub const WS_PING_INTERVAL_SECS: u64 = 30;
