use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::models::message::Channel;

/// A message handed to a consumer, pending acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
    pub redelivered: bool,
}

/// Names of the three durable queues the pipeline runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub inbound: String,
    pub email: String,
    pub push: String,
}

impl QueueTopology {
    pub fn queue_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::Email => &self.email,
            Channel::Push => &self.push,
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.inbound, &self.email, &self.push]
    }
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self {
            inbound: "notifications".to_string(),
            email: "email_notifications".to_string(),
            push: "push_notifications".to_string(),
        }
    }
}

/// Stream of deliveries from one queue.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery. `None` once the underlying connection is gone.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, Error>>;
}

/// Operations the dispatcher and delivery workers need from the broker.
///
/// Implementations own the connection and channel; callers share one client
/// behind an `Arc` and never touch the connection directly.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn Subscription>, Error>;

    /// Publishes a persistent message onto `queue`.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), Error>;

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), Error>;
}
