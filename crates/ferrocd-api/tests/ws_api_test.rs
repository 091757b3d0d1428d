//! Integration tests for the WebSocket notification endpoint.
//!
//! Each test binds the router to an ephemeral local port over an in-memory
//! database, connects real WebSocket clients and drives mutations through the
//! services held in the same application state.

use std::net::SocketAddr;
use std::time::Duration;

use ferrocd_api::{router, AppState, ServerConfig};
use ferrocd_services::{
    Database, Message, NotifyConfig, Payload, Permission, PermissionType, PipelineDefinition,
    Repository, Session, User,
};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const QUIET: Duration = Duration::from_millis(200);
const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    db: Database,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let db = Database::in_memory();
        let (state, _dispatcher) = AppState::new(&db, config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state, db }
    }

    async fn user(&self, email: &str, permission: Option<Permission>) -> User {
        let mut user = User::new(email);
        user.permissions.extend(permission);
        self.db.users.add(user).await.unwrap()
    }

    async fn connect(&self, user_id: &str) -> Result<Client, tungstenite::Error> {
        let url = format!("ws://{}/api/v1/ws?user_id={}", self.addr, user_id);
        connect_async(url).await.map(|(client, _)| client)
    }

    async fn admin_session(&self) -> Session {
        let admin = self
            .user("admin@example.com", Some(Permission::server(PermissionType::Admin)))
            .await;
        self.state.services.gate.open_session(&admin.id).await.unwrap()
    }

    /// Wait until `user_id` has no connection left and its slot is back.
    async fn wait_for_release(&self, user_id: &str) {
        tokio::time::timeout(WAIT, async {
            while self.state.pool.in_use() != 0 || self.state.registry.is_connected(user_id) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription slot returned");
    }
}

/// Next text frame within `wait`, skipping control frames.
async fn next_text(client: &mut Client, wait: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, client.next()).await.ok()??.ok()?;
        if let WsMessage::Text(text) = frame {
            return Some(text);
        }
    }
}

fn handshake_status(result: Result<Client, tungstenite::Error>) -> u16 {
    match result {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected handshake error: {e}"),
        Ok(_) => panic!("handshake unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start(ServerConfig::default()).await;

    let response = reqwest::get(format!("http://{}/health", server.addr)).await.unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_user_is_rejected_before_upgrade() {
    let server = TestServer::start(ServerConfig::default()).await;

    assert_eq!(handshake_status(server.connect("nobody").await), 404);
    assert_eq!(server.state.pool.in_use(), 0);
}

#[tokio::test]
async fn test_disabled_user_is_forbidden() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut user = User::new("gone@example.com");
    user.is_enabled = false;
    let user = server.db.users.add(user).await.unwrap();

    assert_eq!(handshake_status(server.connect(&user.id).await), 403);
}

#[tokio::test]
async fn test_broadcast_reaches_only_permitted_connections() {
    let server = TestServer::start(ServerConfig::default()).await;
    let viewer = server
        .user("viewer@example.com", Some(Permission::server(PermissionType::Viewer)))
        .await;
    let stranger = server.user("stranger@example.com", None).await;

    let mut viewer_ws = server.connect(&viewer.id).await.unwrap();
    let mut stranger_ws = server.connect(&stranger.id).await.unwrap();

    let admin = server.admin_session().await;
    let definition = PipelineDefinition::new("deploy");
    server
        .state
        .services
        .pipeline_definitions
        .add(&admin, definition.clone())
        .await
        .unwrap();

    let frame = next_text(&mut viewer_ws, WAIT).await.expect("viewer receives the add");
    let message = Message::decode(&frame).unwrap();
    assert_eq!(message.operation(), "PipelineDefinitionService.add");
    assert!(matches!(message.envelope.get(), Payload::PipelineDefinition(d) if d.id == definition.id));

    assert!(next_text(&mut stranger_ws, QUIET).await.is_none());
}

#[tokio::test]
async fn test_own_user_update_refreshes_connection_grants() {
    let server = TestServer::start(ServerConfig::default()).await;
    let viewer = server
        .user("viewer@example.com", Some(Permission::server(PermissionType::Viewer)))
        .await;
    let mut viewer_ws = server.connect(&viewer.id).await.unwrap();
    let admin = server.admin_session().await;

    let mut demoted = viewer.clone();
    demoted.permissions.clear();
    server.state.services.users.update(&admin, demoted).await.unwrap();

    let frame = next_text(&mut viewer_ws, WAIT).await.expect("own update delivered");
    let message = Message::decode(&frame).unwrap();
    assert!(message.is_user_update);
    assert_eq!(message.operation(), "UserService.update");

    server
        .state
        .services
        .pipeline_definitions
        .add(&admin, PipelineDefinition::new("deploy"))
        .await
        .unwrap();
    assert!(next_text(&mut viewer_ws, QUIET).await.is_none());
}

#[tokio::test]
async fn test_exhausted_pool_rejects_then_recovers_after_close() {
    let config = ServerConfig {
        notify: NotifyConfig::default()
            .with_pool_size(1)
            .with_checkout_timeout_ms(50),
        ..ServerConfig::default()
    };
    let server = TestServer::start(config).await;
    let first = server.user("first@example.com", None).await;
    let second = server.user("second@example.com", None).await;

    let mut first_ws = server.connect(&first.id).await.unwrap();
    assert_eq!(handshake_status(server.connect(&second.id).await), 503);
    assert!(server.state.registry.is_connected(&first.id));
    assert!(!server.state.registry.is_connected(&second.id));

    first_ws.close(None).await.unwrap();
    server.wait_for_release(&first.id).await;

    assert!(server.connect(&second.id).await.is_ok());
}
