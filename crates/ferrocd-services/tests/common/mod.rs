//! Shared setup for service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ferrocd_services::{
    BroadcastTransport, Database, Delivery, DispatchStats, Listener, ListenerHandle, Message,
    MessageDispatcher, Permission, PermissionType, Services, Session, SessionRegistry,
    Subscription, SubscriptionPool, Transport, User,
};
use tokio::sync::mpsc;

pub const CHANNEL: &str = "test.messages";

pub struct TestContext {
    pub db: Database,
    pub services: Services,
    pub registry: Arc<SessionRegistry>,
    pub transport: Arc<BroadcastTransport>,
    pub stats: Arc<DispatchStats>,
    pub dispatcher: MessageDispatcher,
    pub pool: SubscriptionPool,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_database(Database::in_memory())
    }

    pub fn with_database(db: Database) -> Self {
        let transport = Arc::new(BroadcastTransport::new(64));
        let registry = Arc::new(SessionRegistry::new());
        let (dispatcher, handle) = MessageDispatcher::start(transport.clone(), CHANNEL);
        let stats = handle.stats();
        let services = Services::new(&db, dispatcher.clone(), registry.clone());
        let pool = SubscriptionPool::new(transport.clone(), 8, Duration::from_millis(50));
        Self {
            db,
            services,
            registry,
            transport,
            stats,
            dispatcher,
            pool,
        }
    }

    /// Raw subscription on the notification channel.
    pub async fn tap(&self) -> Subscription {
        self.transport.subscribe(CHANNEL).await.unwrap()
    }

    /// Wait until every dispatched message has left the dispatcher.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.stats.published() + self.stats.failed() < self.stats.dispatched() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Live connection for `user_id`, refreshing group grants through the
    /// gate the way the API does. Messages dispatched earlier are not seen.
    pub async fn connect(&self, user_id: &str) -> (ListenerHandle, mpsc::Receiver<Delivery>) {
        self.settle().await;
        let session = self.services.gate.open_session(user_id).await.unwrap();
        let (tx, rx) = mpsc::channel(16);
        let mut listener = Listener::new(session, self.registry.clone(), tx)
            .with_grant_resolver(self.services.gate.clone());
        listener.subscribe(&self.pool, CHANNEL).await.unwrap();
        (listener.spawn().unwrap(), rx)
    }
}

pub fn admin() -> Session {
    Session::for_user(User::new("admin@example.com").with_permission(Permission::server(PermissionType::Admin)))
}

pub fn viewer() -> Session {
    Session::for_user(User::new("viewer@example.com").with_permission(Permission::server(PermissionType::Viewer)))
}

/// Next message on `tap`, if one arrives soon.
pub async fn next_message(tap: &mut Subscription) -> Option<Message> {
    let raw = tokio::time::timeout(Duration::from_millis(200), tap.recv())
        .await
        .ok()?
        .ok()?;
    Message::decode(&raw).ok()
}

/// Operation of the next delivery on `rx`, if one arrives soon.
pub async fn next_delivered(rx: &mut mpsc::Receiver<Delivery>) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .ok()
        .flatten()
        .map(|delivery| delivery.message.operation())
}
