//! HTTP server configuration.

use std::time::Duration;

use ferrocd_services::{defaults, NotifyConfig};

/// Bind address, keep-alive and notification settings for the API binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds between WebSocket pings.
    pub ws_ping_interval_secs: u64,
    /// Email of an ADMIN account created at startup, if set.
    pub bootstrap_admin_email: Option<String>,
    pub notify: NotifyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            ws_ping_interval_secs: defaults::WS_PING_INTERVAL_SECS,
            bootstrap_admin_email: None,
            notify: NotifyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind host |
    /// | `PORT` | `8080` | Bind port |
    /// | `WS_PING_INTERVAL_SECS` | `30` | WebSocket keep-alive |
    /// | `BOOTSTRAP_ADMIN_EMAIL` | unset | Create an admin account on startup |
    ///
    /// Notification settings are read by [`NotifyConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::SERVER_HOST.to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::SERVER_PORT);
        let ws_ping_interval_secs = std::env::var("WS_PING_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WS_PING_INTERVAL_SECS)
            .max(1);
        let bootstrap_admin_email = std::env::var("BOOTSTRAP_ADMIN_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            host,
            port,
            ws_ping_interval_secs,
            bootstrap_admin_email,
            notify: NotifyConfig::from_env(),
        }
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
