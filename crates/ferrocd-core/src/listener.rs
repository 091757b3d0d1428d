//! Per-connection message listener.
//!
//! A [`Listener`] binds one live client connection to one pooled
//! subscription on the notification channel. Each received message is
//! decoded and run through [`should_deliver`]; accepted messages are pushed
//! to the connection's outbound queue, everything else is dropped silently.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──subscribe()──► Subscribed ──spawn()──► Receiving ──► Closed
//!    └──────────── checkout failure ──────────────────────────────┘
//! ```
//!
//! `Closed` is terminal. A listener closes when its [`ListenerHandle`] is
//! closed or dropped, when the outbound queue's receiver goes away, or when
//! the transport closes the subscription. Closing returns the pool slot and
//! removes the connection from the [`SessionRegistry`]. Closing also
//! interrupts a send blocked on a full outbound queue.
//!
//! ## Grant refresh
//!
//! With a [`GrantResolver`] attached, the session's group grants are
//! resolved again after a user-update for the session's own user, and after
//! any message carrying a group the user belongs to or is leaving.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::Payload;
use crate::error::{Error, Result};
use crate::logging;
use crate::message::{DeliveryClass, Message};
use crate::permission::PermissionType;
use crate::pool::{PooledSubscription, SubscriptionPool};
use crate::session::{Session, SessionRegistry};
use crate::traits::GrantResolver;
use crate::transport::SubscriptionError;

/// Observable listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Subscribed,
    Receiving,
    Closed,
}

/// A message accepted for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub class: DeliveryClass,
    pub message: Message,
}

/// Decide whether `session`'s connection may see `message`.
///
/// Owner-targeted messages go only to the owner. Otherwise the stamped
/// requirement for the session's user is compared with what the session is
/// granted at the message scope; a user missing from the map only sees
/// messages that require nothing.
pub fn should_deliver(session: &Session, message: &Message) -> Option<DeliveryClass> {
    let class = message.delivery_class();
    let deliver = match class {
        DeliveryClass::OwnerTargeted => message.owner_id.as_deref() == Some(session.user_id()),
        DeliveryClass::Broadcast | DeliveryClass::UserUpdate => {
            match message.permission_type_for(session.user_id()) {
                None => message.required_permission_type == PermissionType::None,
                Some(required) => session.granted_at(&message.scope).satisfies(required),
            }
        }
    };
    deliver.then_some(class)
}

/// Removes the connection from the registry when dropped.
struct Registration {
    registry: Arc<SessionRegistry>,
    user_id: String,
}

impl Registration {
    fn new(registry: Arc<SessionRegistry>, user_id: &str) -> Self {
        registry.register(user_id);
        Self {
            registry,
            user_id: user_id.to_string(),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.user_id);
    }
}

/// One live connection's view of the notification channel.
pub struct Listener {
    id: Uuid,
    session: Session,
    registry: Arc<SessionRegistry>,
    outbound: mpsc::Sender<Delivery>,
    grants: Option<Arc<dyn GrantResolver>>,
    subscription: Option<PooledSubscription>,
    registration: Option<Registration>,
    state: watch::Sender<ListenerState>,
}

impl Listener {
    pub fn new(session: Session, registry: Arc<SessionRegistry>, outbound: mpsc::Sender<Delivery>) -> Self {
        let (state, _) = watch::channel(ListenerState::Created);
        Self {
            id: Uuid::new_v4(),
            session,
            registry,
            outbound,
            grants: None,
            subscription: None,
            registration: None,
            state,
        }
    }

    /// Re-resolve group grants through `grants` when membership changes.
    pub fn with_grant_resolver(mut self, grants: Arc<dyn GrantResolver>) -> Self {
        self.grants = Some(grants);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check out a subscription on `channel` and register the connection.
    ///
    /// A checkout failure closes the listener for good.
    pub async fn subscribe(&mut self, pool: &SubscriptionPool, channel: &str) -> Result<()> {
        match self.state() {
            ListenerState::Created => {}
            ListenerState::Closed => {
                return Err(Error::InvalidInput(format!(
                    "listener {} is closed and cannot be reused",
                    self.id
                )))
            }
            ListenerState::Subscribed | ListenerState::Receiving => {
                return Err(Error::InvalidInput(format!(
                    "listener {} is already subscribed",
                    self.id
                )))
            }
        }

        let subscription = match pool.checkout(channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::LISTENER,
                    listener_id = %self.id,
                    user_id = %self.session.user_id(),
                    channel,
                    error = %e,
                    "Listener failed to subscribe"
                );
                self.state.send_replace(ListenerState::Closed);
                return Err(e);
            }
        };

        self.subscription = Some(subscription);
        self.registration = Some(Registration::new(self.registry.clone(), self.session.user_id()));
        self.state.send_replace(ListenerState::Subscribed);
        debug!(
            subsystem = logging::NOTIFY,
            component = logging::LISTENER,
            listener_id = %self.id,
            user_id = %self.session.user_id(),
            channel,
            "Listener subscribed"
        );
        Ok(())
    }

    /// Start the receive loop on its own task.
    pub fn spawn(self) -> Result<ListenerHandle> {
        if self.state() != ListenerState::Subscribed {
            return Err(Error::InvalidInput(format!(
                "listener {} must be subscribed before it can receive",
                self.id
            )));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = self.id;
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(cancel_rx));

        Ok(ListenerHandle {
            id,
            cancel: cancel_tx,
            state,
            join,
        })
    }

    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let Some(mut subscription) = self.subscription.take() else {
            self.state.send_replace(ListenerState::Closed);
            return;
        };
        self.state.send_replace(ListenerState::Receiving);
        info!(
            subsystem = logging::NOTIFY,
            component = logging::LISTENER,
            listener_id = %self.id,
            user_id = %self.session.user_id(),
            channel = subscription.channel(),
            "Listener opened"
        );

        let mut delivered: u64 = 0;
        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.changed() => Err(SubscriptionError::Cancelled),
                _ = self.outbound.closed() => Err(SubscriptionError::Cancelled),
                received = subscription.recv() => received,
            };

            match next {
                Ok(raw) => {
                    let Some(delivery) = self.accept(&raw).await else {
                        continue;
                    };
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.changed() => Err(SubscriptionError::Cancelled),
                        sent = self.outbound.send(delivery) => {
                            sent.map_err(|_| SubscriptionError::Cancelled)
                        }
                    };
                    match sent {
                        Ok(()) => delivered += 1,
                        Err(e) => break e,
                    }
                }
                Err(SubscriptionError::Lagged(missed)) => {
                    warn!(
                        subsystem = logging::NOTIFY,
                        component = logging::LISTENER,
                        listener_id = %self.id,
                        missed,
                        "Listener lagged, skipping ahead"
                    );
                }
                Err(e) => break e,
            }
        };

        drop(subscription);
        self.registration.take();
        self.state.send_replace(ListenerState::Closed);
        info!(
            subsystem = logging::NOTIFY,
            component = logging::LISTENER,
            listener_id = %self.id,
            user_id = %self.session.user_id(),
            delivered,
            reason = %reason,
            "Listener closed"
        );
    }

    /// Decode, filter and refresh; returns what to push to the connection.
    async fn accept(&mut self, raw: &str) -> Option<Delivery> {
        let message = match Message::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::LISTENER,
                    listener_id = %self.id,
                    error = %e,
                    "Undecodable message skipped"
                );
                return None;
            }
        };

        let class = should_deliver(&self.session, &message);
        let regrant = match message.envelope.get() {
            Payload::User(user) => {
                let own = class == Some(DeliveryClass::UserUpdate) && user.id == self.session.user_id();
                if own {
                    self.session.refresh_user(user.clone());
                }
                own
            }
            Payload::UserGroup(group) => {
                group.references_user(self.session.user_id())
                    || self.session.user().references_group(&group.id)
            }
            _ => false,
        };
        if regrant {
            self.refresh_group_grants().await;
        }

        let Some(class) = class else {
            debug!(
                subsystem = logging::NOTIFY,
                component = logging::LISTENER,
                listener_id = %self.id,
                op = %message.operation(),
                delivery = logging::DELIVERY_DROPPED,
                "Message filtered"
            );
            return None;
        };

        debug!(
            subsystem = logging::NOTIFY,
            component = logging::LISTENER,
            listener_id = %self.id,
            op = %message.operation(),
            delivery = delivery_label(class),
            "Message delivered"
        );
        Some(Delivery { class, message })
    }

    /// A resolver failure leaves the session with no group grants.
    async fn refresh_group_grants(&mut self) {
        let Some(grants) = self.grants.clone() else {
            return;
        };
        match grants.group_permissions(self.session.user()).await {
            Ok(group_permissions) => {
                debug!(
                    subsystem = logging::NOTIFY,
                    component = logging::LISTENER,
                    listener_id = %self.id,
                    user_id = %self.session.user_id(),
                    grants = group_permissions.len(),
                    "Group grants refreshed"
                );
                self.session.replace_group_permissions(group_permissions);
            }
            Err(e) => {
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::LISTENER,
                    listener_id = %self.id,
                    user_id = %self.session.user_id(),
                    error = %e,
                    "Group grants could not be resolved, dropping them"
                );
                self.session.replace_group_permissions(Vec::new());
            }
        }
    }
}

fn delivery_label(class: DeliveryClass) -> &'static str {
    match class {
        DeliveryClass::Broadcast => logging::DELIVERY_BROADCAST,
        DeliveryClass::OwnerTargeted => logging::DELIVERY_OWNER,
        DeliveryClass::UserUpdate => logging::DELIVERY_USER_UPDATE,
    }
}

/// Control handle for a running listener.
///
/// Dropping the handle cancels the listener.
pub struct ListenerHandle {
    id: Uuid,
    cancel: watch::Sender<bool>,
    state: watch::Receiver<ListenerState>,
    join: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Ask the listener to stop. Idempotent.
    pub fn close(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait until the listener has reached `Closed`.
    pub async fn closed(&mut self) {
        // An error means the task is gone, which only happens after Closed.
        let _ = self.state.wait_for(|state| *state == ListenerState::Closed).await;
    }

    /// Close the listener and wait for its task to finish.
    pub async fn shutdown(self) {
        self.close();
        if let Err(e) = self.join.await {
            warn!(
                subsystem = logging::NOTIFY,
                component = logging::LISTENER,
                listener_id = %self.id,
                error = %e,
                "Listener task ended abnormally"
            );
        }
    }
}
