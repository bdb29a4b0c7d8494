use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::broker::{BrokerClient, Delivery},
    error::PipelineError,
    models::{message::Notification, status::DeliveryOutcome},
};

/// Channel-specific side effect performed for each notification.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Nack without requeue; the message is gone.
    Drop,
    /// Nack with requeue; the broker hands the message out again.
    Requeue,
}

/// Decides what happens to a message whose processing failed.
///
/// Malformed messages never reach the policy; they are always dropped.
pub trait FailurePolicy: Send + Sync {
    fn on_failure(&self, queue: &str, error: &PipelineError) -> FailureAction;
}

/// Drops every failed message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropOnFailure;

impl FailurePolicy for DropOnFailure {
    fn on_failure(&self, _queue: &str, _error: &PipelineError) -> FailureAction {
        FailureAction::Drop
    }
}

/// Consumes one downstream queue and hands each notification to its backend.
pub struct DeliveryWorker {
    name: String,
    queue: String,
    broker: Arc<dyn BrokerClient>,
    backend: Arc<dyn DeliveryBackend>,
    failure_policy: Arc<dyn FailurePolicy>,
}

impl DeliveryWorker {
    pub fn new(
        name: impl Into<String>,
        queue: impl Into<String>,
        broker: Arc<dyn BrokerClient>,
        backend: Arc<dyn DeliveryBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            broker,
            backend,
            failure_policy: Arc::new(DropOnFailure),
        }
    }

    pub fn with_failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handles one delivery to completion. Errors only on broker failures.
    pub async fn process(&self, delivery: &Delivery) -> Result<DeliveryOutcome, Error> {
        let result = match Notification::decode(&delivery.data) {
            Ok(notification) => self.backend.deliver(&notification).await.map(|_| notification),
            Err(e) => Err(e),
        };

        match result {
            Ok(notification) => {
                self.broker.acknowledge(delivery.delivery_tag).await?;

                info!(
                    worker = %self.name,
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    notification_type = notification.kind(),
                    user_id = %notification.user_id(),
                    "Notification delivered"
                );

                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                // An undecodable body fails the same way on every redelivery.
                let requeue = match &e {
                    PipelineError::Decode(_) => false,
                    _ => self.failure_policy.on_failure(&self.queue, &e) == FailureAction::Requeue,
                };

                self.broker.nack(delivery.delivery_tag, requeue).await?;

                error!(
                    worker = %self.name,
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    redelivered = delivery.redelivered,
                    requeue,
                    error = %e,
                    "Notification delivery failed"
                );

                Ok(if requeue {
                    DeliveryOutcome::Requeued
                } else {
                    DeliveryOutcome::Dropped
                })
            }
        }
    }

    /// Consumes until the subscription ends, which only happens when the connection goes away.
    pub async fn run(&self) -> Result<(), Error> {
        let consumer_tag = format!("{}-{}", self.name, Uuid::new_v4().simple());
        let mut subscription = self.broker.subscribe(&self.queue, &consumer_tag).await?;

        info!(
            worker = %self.name,
            queue = %self.queue,
            consumer_tag = %consumer_tag,
            "Delivery worker started"
        );

        while let Some(delivery) = subscription.next_delivery().await {
            let delivery = delivery?;
            self.process(&delivery).await?;
        }

        warn!(worker = %self.name, queue = %self.queue, "Delivery worker subscription ended");

        Err(PipelineError::Connection(format!("Consumer on {} was closed", self.queue)).into())
    }
}
