//! Shared application state.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use ferrocd_services::{
    BroadcastTransport, Database, DispatcherHandle, MessageDispatcher, Services, SessionRegistry,
    SubscriptionPool, Transport,
};

use crate::config::ServerConfig;

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub pool: SubscriptionPool,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
    /// Active WebSocket connection count.
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    /// Wire the notification bus and the services over `db`.
    ///
    /// The returned handle finishes once every clone of the state is gone and
    /// the dispatcher queue has drained.
    pub fn new(db: &Database, config: ServerConfig) -> (Self, DispatcherHandle) {
        let notify = &config.notify;
        let transport: Arc<dyn Transport> = Arc::new(BroadcastTransport::new(notify.channel_capacity));
        let (dispatcher, dispatcher_handle) = MessageDispatcher::start(transport.clone(), notify.channel.clone());
        let pool = SubscriptionPool::new(transport, notify.pool_size, notify.checkout_timeout());
        let registry = Arc::new(SessionRegistry::new());
        let services = Services::new(db, dispatcher, registry.clone());

        (
            Self {
                services,
                pool,
                registry,
                config: Arc::new(config),
                ws_connections: Arc::new(AtomicUsize::new(0)),
            },
            dispatcher_handle,
        )
    }
}
