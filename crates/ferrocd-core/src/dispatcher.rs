//! Process-wide message dispatcher.
//!
//! Every service operation hands its finished [`Message`] to
//! [`MessageDispatcher::dispatch`]. The call only enqueues: a single publisher
//! task drains the queue, encodes each message and publishes it on the
//! well-known channel. Callers therefore never wait for the transport or for
//! subscribers, and messages from one caller reach the channel in the order
//! they were dispatched.
//!
//! ```text
//! service ─┐
//! service ─┼─ dispatch() ─► mpsc queue ─► publisher task ─► Transport::publish(channel)
//! service ─┘
//! ```
//!
//! Publish failures are logged and dropped; they never surface to the caller
//! that produced the message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::logging;
use crate::message::Message;
use crate::traits::Transport;

/// Counters shared between the dispatcher handles and the publisher task.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cloneable entry point injected into every service.
///
/// Constructed once at process start via [`MessageDispatcher::start`].
#[derive(Clone)]
pub struct MessageDispatcher {
    tx: mpsc::UnboundedSender<Message>,
    channel: Arc<str>,
    stats: Arc<DispatchStats>,
}

/// Handle on the publisher task.
///
/// The task ends once every [`MessageDispatcher`] clone has been dropped and
/// the queue is drained.
pub struct DispatcherHandle {
    join: JoinHandle<()>,
    stats: Arc<DispatchStats>,
}

impl DispatcherHandle {
    /// Wait until the publisher task has flushed the queue and exited.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            warn!(
                subsystem = logging::NOTIFY,
                component = logging::DISPATCHER,
                error = %e,
                "Dispatcher task ended abnormally"
            );
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

impl MessageDispatcher {
    /// Spawn the publisher task and return the dispatcher plus its handle.
    pub fn start(transport: Arc<dyn Transport>, channel: impl Into<String>) -> (Self, DispatcherHandle) {
        let channel: Arc<str> = Arc::from(channel.into());
        let stats = Arc::new(DispatchStats::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let join = tokio::spawn(publish_loop(
            rx,
            transport,
            channel.clone(),
            stats.clone(),
        ));

        (
            Self {
                tx,
                channel,
                stats: stats.clone(),
            },
            DispatcherHandle { join, stats },
        )
    }

    /// Enqueue `message` for publication. Never blocks and never fails the
    /// caller.
    pub fn dispatch(&self, message: Message) {
        let message_id = message.message_id;
        let operation = message.operation();
        match self.tx.send(message) {
            Ok(()) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subsystem = logging::NOTIFY,
                    component = logging::DISPATCHER,
                    op = %operation,
                    %message_id,
                    "Message dispatched"
                );
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::DISPATCHER,
                    op = %operation,
                    %message_id,
                    "Dispatcher stopped, message dropped"
                );
            }
        }
    }

    /// The channel messages are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

async fn publish_loop(
    mut rx: mpsc::UnboundedReceiver<Message>,
    transport: Arc<dyn Transport>,
    channel: Arc<str>,
    stats: Arc<DispatchStats>,
) {
    info!(
        subsystem = logging::NOTIFY,
        component = logging::DISPATCHER,
        channel = %channel,
        "Dispatcher started"
    );

    while let Some(message) = rx.recv().await {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::DISPATCHER,
                    op = %message.operation(),
                    error = %e,
                    "Failed to encode message"
                );
                continue;
            }
        };

        match transport.publish(&channel, payload).await {
            Ok(subscriber_count) => {
                stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subsystem = logging::NOTIFY,
                    component = logging::DISPATCHER,
                    channel = %channel,
                    message_id = %message.message_id,
                    subscriber_count,
                    "Message published"
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = logging::NOTIFY,
                    component = logging::DISPATCHER,
                    channel = %channel,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to publish message"
                );
            }
        }
    }

    info!(
        subsystem = logging::NOTIFY,
        component = logging::DISPATCHER,
        channel = %channel,
        published = stats.published(),
        "Dispatcher stopped"
    );
}
