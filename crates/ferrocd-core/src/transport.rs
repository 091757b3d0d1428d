//! In-process pub/sub transport over `tokio::sync::broadcast`.
//!
//! Each channel name maps to one broadcast sender created on first use.
//! Subscribers receive every payload published after they subscribed, in
//! publish order. Slow subscribers that fall more than the channel capacity
//! behind get [`SubscriptionError::Lagged`] and skip ahead.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::traits::Transport;

/// Errors from receiving on a subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// All publishers for the channel are gone.
    #[error("subscription closed")]
    Closed,
    /// Payloads were missed due to slow consumption.
    #[error("lagged behind by {0} messages")]
    Lagged(u64),
    /// The owning listener was told to stop.
    #[error("subscription cancelled")]
    Cancelled,
}

/// A live subscription to one channel.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next payload.
    pub async fn recv(&mut self) -> std::result::Result<String, SubscriptionError> {
        match self.receiver.recv().await {
            Ok(payload) => Ok(payload),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(SubscriptionError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }
}

/// Process-local [`Transport`].
#[derive(Debug)]
pub struct BroadcastTransport {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl BroadcastTransport {
    /// Create a transport whose channels buffer `capacity` payloads.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> Result<broadcast::Sender<String>> {
        if let Ok(channels) = self.channels.read() {
            if let Some(tx) = channels.get(channel) {
                return Ok(tx.clone());
            }
        }
        let mut channels = self
            .channels
            .write()
            .map_err(|_| Error::Transport(format!("channel table poisoned ({})", channel)))?;
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(tx.clone())
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        match self.channels.read() {
            Ok(channels) => channels
                .get(channel)
                .map(|tx| tx.receiver_count())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl Transport for BroadcastTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let tx = self.sender(channel)?;
        // No receivers is not a failure: nothing is retained for late joiners.
        Ok(tx.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let tx = self.sender(channel)?;
        Ok(Subscription::new(channel, tx.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let transport = BroadcastTransport::new(32);
        let mut a = transport.subscribe("c").await.unwrap();
        let mut b = transport.subscribe("c").await.unwrap();

        assert_eq!(transport.publish("c", "1".into()).await.unwrap(), 2);
        transport.publish("c", "2".into()).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), "1");
        assert_eq!(a.recv().await.unwrap(), "2");
        assert_eq!(b.recv().await.unwrap(), "1");
        assert_eq!(b.recv().await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let transport = BroadcastTransport::new(32);
        assert_eq!(transport.publish("empty", "x".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let transport = BroadcastTransport::new(32);
        let mut other = transport.subscribe("other").await.unwrap();
        transport.publish("main", "x".into()).await.unwrap();
        transport.publish("other", "y".into()).await.unwrap();
        assert_eq!(other.recv().await.unwrap(), "y");
        assert_eq!(other.channel(), "other");
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let transport = BroadcastTransport::new(32);
        let sub = transport.subscribe("c").await.unwrap();
        assert_eq!(transport.subscriber_count("c"), 1);
        drop(sub);
        assert_eq!(transport.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let transport = BroadcastTransport::new(2);
        let mut sub = transport.subscribe("c").await.unwrap();
        for i in 0..5 {
            transport.publish("c", i.to_string()).await.unwrap();
        }
        assert!(matches!(sub.recv().await, Err(SubscriptionError::Lagged(_))));
        assert_eq!(sub.recv().await.unwrap(), "3");
    }
}
