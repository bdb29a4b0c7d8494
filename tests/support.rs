use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use notification_service::{
    clients::{
        broker::{BrokerClient, Delivery, QueueTopology},
        memory::{InMemoryBroker, JournalEntry},
    },
    error::PipelineError,
    models::message::Notification,
    worker::DeliveryBackend,
};
use serde_json::Value;
use tokio::{
    sync::Notify,
    time::{Duration, sleep, timeout},
};

pub const T: &str = "2024-01-01T00:00:00Z";

pub fn topology() -> QueueTopology {
    QueueTopology::default()
}

pub fn broker() -> InMemoryBroker {
    InMemoryBroker::new(&topology())
}

pub async fn publish_json(broker: &InMemoryBroker, queue: &str, value: &Value) {
    broker
        .publish(queue, value.to_string().as_bytes())
        .await
        .unwrap();
}

/// Pulls the head of `queue` through a fresh consumer.
pub async fn take(broker: &InMemoryBroker, queue: &str) -> Delivery {
    let tag = format!("test-{}", uuid::Uuid::new_v4().simple());
    let mut subscription = broker.subscribe(queue, &tag).await.unwrap();

    timeout(Duration::from_secs(1), subscription.next_delivery())
        .await
        .expect("no delivery within a second")
        .expect("subscription closed")
        .unwrap()
}

pub fn pending_json(broker: &InMemoryBroker, queue: &str) -> Vec<Value> {
    broker
        .pending(queue)
        .iter()
        .map(|body| serde_json::from_slice(body).unwrap())
        .collect()
}

pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within five seconds");
}

/// Checks that no consumer was handed a delivery while it still held one.
pub fn assert_one_in_flight_per_consumer(journal: &[JournalEntry]) {
    let mut held: HashMap<String, Option<u64>> = HashMap::new();

    for entry in journal {
        match entry {
            JournalEntry::Delivered {
                consumer,
                delivery_tag,
                ..
            } => {
                let slot = held.entry(consumer.clone()).or_default();
                assert!(
                    slot.is_none(),
                    "{} got delivery {} while holding {:?}",
                    consumer,
                    delivery_tag,
                    slot
                );
                *slot = Some(*delivery_tag);
            }
            JournalEntry::Acked {
                consumer,
                delivery_tag,
                ..
            }
            | JournalEntry::Nacked {
                consumer,
                delivery_tag,
                ..
            } => {
                let slot = held.entry(consumer.clone()).or_default();
                assert_eq!(*slot, Some(*delivery_tag), "{} settled out of order", consumer);
                *slot = None;
            }
            JournalEntry::Published { .. } => {}
        }
    }
}

#[derive(Default)]
pub struct RecordingBackend {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingBackend {
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryBackend for RecordingBackend {
    async fn deliver(&self, notification: &Notification) -> Result<(), PipelineError> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct FailingBackend;

#[async_trait]
impl DeliveryBackend for FailingBackend {
    async fn deliver(&self, _notification: &Notification) -> Result<(), PipelineError> {
        Err(PipelineError::Handler("provider unavailable".to_string()))
    }
}

/// Never finishes a delivery; signals once it has started one.
#[derive(Default)]
pub struct HangingBackend {
    pub started: Notify,
}

#[async_trait]
impl DeliveryBackend for HangingBackend {
    async fn deliver(&self, _notification: &Notification) -> Result<(), PipelineError> {
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub fn shared(broker: &InMemoryBroker) -> Arc<dyn BrokerClient> {
    Arc::new(broker.clone())
}
