//! ferrocd-api - WebSocket notification server for ferrocd

use std::net::SocketAddr;
use std::time::Duration;

use ferrocd_api::{router, AppState, ServerConfig};
use ferrocd_services::{Database, Permission, PermissionType, Repository, User};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("ferrocd-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else if log_format == "json" {
        // Console-only output
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();
    info!(
        channel = %config.notify.channel,
        pool_size = config.notify.pool_size,
        checkout_timeout_ms = config.notify.checkout_timeout_ms,
        "Notification bus configured"
    );

    let db = Database::in_memory();
    if let Some(email) = config.bootstrap_admin_email.clone() {
        let admin = db
            .users
            .add(User::new(email).with_permission(Permission::server(PermissionType::Admin)))
            .await?;
        info!(user_id = %admin.id, email = %admin.email, "Bootstrap admin created");
    }

    let addr: SocketAddr = config.bind_address().parse()?;
    let (state, dispatcher) = AppState::new(&db, config);
    let app = router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Upgraded WebSocket tasks may still hold the state, so the drain is bounded.
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, dispatcher.join())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = SHUTDOWN_DRAIN_TIMEOUT.as_secs(),
            "Dispatcher did not drain before shutdown"
        );
    }
    info!("ferrocd-api shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
