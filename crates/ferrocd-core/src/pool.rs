//! Bounded pool of transport subscriptions shared by all listeners.
//!
//! Every checked-out [`PooledSubscription`] holds one semaphore permit.
//! Dropping the subscription (normally when its listener closes) returns the
//! permit, so connection churn can never leak capacity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::logging;
use crate::traits::Transport;
use crate::transport::{Subscription, SubscriptionError};

/// Shared, process-wide subscription pool.
#[derive(Clone)]
pub struct SubscriptionPool {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    capacity: usize,
    checkout_timeout: Duration,
}

impl SubscriptionPool {
    pub fn new(transport: Arc<dyn Transport>, capacity: usize, checkout_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            transport,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            checkout_timeout,
        }
    }

    /// Check out a subscription on `channel`, waiting up to the configured
    /// timeout for a free slot.
    pub async fn checkout(&self, channel: &str) -> Result<PooledSubscription> {
        let permit = tokio::time::timeout(self.checkout_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "subscription pool exhausted ({} in use)",
                    self.capacity
                ))
            })?
            .map_err(|_| Error::Transport("subscription pool closed".to_string()))?;

        let subscription = self.transport.subscribe(channel).await?;
        debug!(
            subsystem = logging::NOTIFY,
            component = logging::POOL,
            channel,
            pool_available = self.available(),
            "Subscription checked out"
        );
        Ok(PooledSubscription {
            subscription,
            _permit: permit,
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently checked out.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

/// A subscription that returns its pool slot when dropped.
#[derive(Debug)]
pub struct PooledSubscription {
    subscription: Subscription,
    _permit: OwnedSemaphorePermit,
}

impl PooledSubscription {
    pub fn channel(&self) -> &str {
        self.subscription.channel()
    }

    pub async fn recv(&mut self) -> std::result::Result<String, SubscriptionError> {
        self.subscription.recv().await
    }
}
