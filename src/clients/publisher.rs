use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::debug;

use crate::{clients::broker::BrokerClient, models::event::Event};

/// Producer-side handle for emitting domain events onto the inbound queue.
pub struct EventPublisher {
    broker: Arc<dyn BrokerClient>,
    queue: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerClient>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
        }
    }

    pub async fn publish(&self, event: &Event) -> Result<(), Error> {
        let payload = serde_json::to_vec(event)?;
        self.broker.publish(&self.queue, &payload).await?;

        debug!(
            queue = %self.queue,
            event_type = %event.event_type,
            "Event published"
        );

        Ok(())
    }
}
