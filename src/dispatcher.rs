use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::broker::{BrokerClient, Delivery, QueueTopology},
    error::PipelineError,
    models::{event::Event, message::Message, status::DispatchOutcome},
    routing::RoutingTable,
    worker::{DropOnFailure, FailureAction, FailurePolicy},
};

/// Sole consumer of the inbound queue. Turns each event into its derived
/// messages and settles the event only after all of them are enqueued.
pub struct Dispatcher {
    broker: Arc<dyn BrokerClient>,
    topology: QueueTopology,
    routing: RoutingTable,
    failure_policy: Arc<dyn FailurePolicy>,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        topology: QueueTopology,
        routing: RoutingTable,
    ) -> Self {
        Self {
            broker,
            topology,
            routing,
            failure_policy: Arc::new(DropOnFailure),
        }
    }

    /// Policy for events whose fan-out could not be enqueued. Malformed events are always dropped.
    pub fn with_failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Processes one inbound delivery. Errors only on broker failures.
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<DispatchOutcome, Error> {
        let messages = match Event::decode(&delivery.data)
            .and_then(|event| self.routing.route(&event).map(|messages| (event, messages)))
        {
            Ok((event, messages)) if messages.is_empty() => {
                info!(
                    delivery_tag = delivery.delivery_tag,
                    event_type = %event.event_type,
                    "No routes for event type, acknowledging"
                );
                self.broker.acknowledge(delivery.delivery_tag).await?;
                return Ok(DispatchOutcome::Ignored);
            }
            Ok((event, messages)) => {
                debug!(
                    delivery_tag = delivery.delivery_tag,
                    event_type = %event.event_type,
                    redelivered = delivery.redelivered,
                    messages = messages.len(),
                    "Event routed"
                );
                messages
            }
            Err(e) => {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    payload = %String::from_utf8_lossy(&delivery.data),
                    "Dropping poison message"
                );
                self.broker.nack(delivery.delivery_tag, false).await?;
                return Ok(DispatchOutcome::Poisoned);
            }
        };

        if let Err(e) = self.enqueue_all(&messages).await {
            let requeue = self.failure_policy.on_failure(&self.topology.inbound, &e)
                == FailureAction::Requeue;

            error!(
                delivery_tag = delivery.delivery_tag,
                requeue,
                error = %e,
                "Fan-out failed, rejecting event"
            );
            self.broker.nack(delivery.delivery_tag, requeue).await?;
            return Ok(DispatchOutcome::EnqueueFailed);
        }

        self.broker.acknowledge(delivery.delivery_tag).await?;

        Ok(DispatchOutcome::Forwarded(messages.len()))
    }

    async fn enqueue_all(&self, messages: &[Message]) -> Result<(), PipelineError> {
        for message in messages {
            let queue = self.topology.queue_for(message.channel);
            let payload = message
                .notification
                .encode()
                .map_err(|e| PipelineError::enqueue(queue, e))?;

            self.broker
                .publish(queue, &payload)
                .await
                .map_err(|e| PipelineError::enqueue(queue, e))?;

            info!(
                queue,
                notification_type = message.notification.kind(),
                "Sent message to queue"
            );
        }

        Ok(())
    }

    /// Consumes the inbound queue until the subscription ends.
    pub async fn run(&self) -> Result<(), Error> {
        let consumer_tag = format!("dispatcher-{}", Uuid::new_v4().simple());
        let mut subscription = self
            .broker
            .subscribe(&self.topology.inbound, &consumer_tag)
            .await?;

        info!(
            queue = %self.topology.inbound,
            consumer_tag = %consumer_tag,
            "Notification dispatcher started"
        );

        while let Some(delivery) = subscription.next_delivery().await {
            let delivery = delivery?;
            let outcome = self.dispatch(&delivery).await?;
            debug!(delivery_tag = delivery.delivery_tag, outcome = %outcome, "Event settled");
        }

        warn!(queue = %self.topology.inbound, "Dispatcher subscription ended");

        Err(PipelineError::Connection(format!(
            "Consumer on {} was closed",
            self.topology.inbound
        ))
        .into())
    }
}
