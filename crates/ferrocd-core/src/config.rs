//! Notification subsystem configuration.

use std::time::Duration;

use crate::defaults;

/// Configuration for the dispatcher, transport and listener pool.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Well-known channel every message is published on.
    pub channel: String,
    /// Broadcast buffer per channel.
    pub channel_capacity: usize,
    /// Maximum concurrent subscriptions.
    pub pool_size: usize,
    /// How long a connection waits for a free subscription.
    pub checkout_timeout_ms: u64,
    /// Per-connection delivery buffer.
    pub outbound_buffer: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: defaults::NOTIFY_CHANNEL.to_string(),
            channel_capacity: defaults::NOTIFY_CHANNEL_CAPACITY,
            pool_size: defaults::NOTIFY_POOL_SIZE,
            checkout_timeout_ms: defaults::NOTIFY_CHECKOUT_TIMEOUT_MS,
            outbound_buffer: defaults::NOTIFY_OUTBOUND_BUFFER,
        }
    }
}

impl NotifyConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTIFY_CHANNEL` | `ferrocd.messages` | Transport channel |
    /// | `NOTIFY_CHANNEL_CAPACITY` | `256` | Broadcast buffer per channel |
    /// | `NOTIFY_POOL_SIZE` | `1024` | Max concurrent subscriptions |
    /// | `NOTIFY_CHECKOUT_TIMEOUT_MS` | `5000` | Wait for a free subscription |
    /// | `NOTIFY_OUTBOUND_BUFFER` | `64` | Per-connection delivery buffer |
    pub fn from_env() -> Self {
        let channel = std::env::var("NOTIFY_CHANNEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::NOTIFY_CHANNEL.to_string());

        let channel_capacity = env_parse("NOTIFY_CHANNEL_CAPACITY")
            .unwrap_or(defaults::NOTIFY_CHANNEL_CAPACITY)
            .max(1);

        let pool_size = env_parse("NOTIFY_POOL_SIZE")
            .unwrap_or(defaults::NOTIFY_POOL_SIZE)
            .max(1);

        let checkout_timeout_ms =
            env_parse("NOTIFY_CHECKOUT_TIMEOUT_MS").unwrap_or(defaults::NOTIFY_CHECKOUT_TIMEOUT_MS);

        let outbound_buffer = env_parse("NOTIFY_OUTBOUND_BUFFER")
            .unwrap_or(defaults::NOTIFY_OUTBOUND_BUFFER)
            .max(1);

        Self {
            channel,
            channel_capacity,
            pool_size,
            checkout_timeout_ms,
            outbound_buffer,
        }
    }

    /// Set the transport channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the maximum number of concurrent subscriptions.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Set the checkout timeout.
    pub fn with_checkout_timeout_ms(mut self, ms: u64) -> Self {
        self.checkout_timeout_ms = ms;
        self
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_constants() {
        let config = NotifyConfig::default();
        assert_eq!(config.channel, defaults::NOTIFY_CHANNEL);
        assert_eq!(config.pool_size, defaults::NOTIFY_POOL_SIZE);
        assert_eq!(
            config.checkout_timeout(),
            Duration::from_millis(defaults::NOTIFY_CHECKOUT_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_builders_clamp_pool_size() {
        let config = NotifyConfig::default()
            .with_channel("test.channel")
            .with_pool_size(0)
            .with_checkout_timeout_ms(10);
        assert_eq!(config.channel, "test.channel");
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.checkout_timeout_ms, 10);
    }
}
