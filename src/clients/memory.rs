//! In-process broker with the same delivery contract as the RabbitMQ client.
//!
//! Queues are FIFO, every consumer is limited to `prefetch` unacknowledged
//! deliveries, and every delivery, ack and nack is appended to a journal so tests
//! can check ordering against acknowledgement. Closing the broker hands unacked
//! messages back to the head of their queue, flagged as redelivered.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::{
    clients::broker::{BrokerClient, Delivery, QueueTopology, Subscription},
    config::PREFETCH_COUNT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Published { queue: String },
    Delivered { queue: String, consumer: String, delivery_tag: u64 },
    Acked { queue: String, consumer: String, delivery_tag: u64 },
    Nacked { queue: String, consumer: String, delivery_tag: u64, requeue: bool },
}

#[derive(Debug, Clone)]
struct StoredMessage {
    data: Vec<u8>,
    redelivered: bool,
}

struct InFlight {
    queue: String,
    consumer: String,
    message: StoredMessage,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    in_flight: HashMap<u64, InFlight>,
    consumers: HashMap<String, usize>,
    rejected_queues: HashSet<String>,
    journal: Vec<JournalEntry>,
    next_tag: u64,
    closed: bool,
}

impl State {
    fn settle(&mut self, delivery_tag: u64) -> Result<InFlight, Error> {
        let entry = self
            .in_flight
            .remove(&delivery_tag)
            .ok_or_else(|| anyhow!("Unknown delivery tag {}", delivery_tag))?;

        if let Some(count) = self.consumers.get_mut(&entry.consumer) {
            *count = count.saturating_sub(1);
        }

        Ok(entry)
    }
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    prefetch: usize,
}

impl InMemoryBroker {
    pub fn new(topology: &QueueTopology) -> Self {
        let mut state = State::default();
        for queue in topology.all() {
            state.queues.insert(queue.to_string(), VecDeque::new());
        }

        Self {
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
            prefetch: usize::from(PREFETCH_COUNT),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Error> {
        self.state
            .lock()
            .map_err(|_| anyhow!("In-memory broker state poisoned"))
    }

    fn lock_unchecked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every later publish to `queue` fail.
    pub fn reject_publishes_to(&self, queue: &str) {
        self.lock_unchecked().rejected_queues.insert(queue.to_string());
    }

    /// Bodies currently waiting in `queue`, head first. Unacked messages are not included.
    pub fn pending(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock_unchecked()
            .queues
            .get(queue)
            .map(|messages| messages.iter().map(|m| m.data.clone()).collect())
            .unwrap_or_default()
    }

    pub fn unacked_count(&self) -> usize {
        self.lock_unchecked().in_flight.len()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock_unchecked().journal.clone()
    }

    /// Accepts connections again after `close`, as a fresh consumer process would.
    pub fn reopen(&self) {
        self.lock_unchecked().closed = false;
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn Subscription>, Error> {
        let mut state = self.lock()?;

        if state.closed {
            return Err(anyhow!("Broker connection is closed"));
        }
        if !state.queues.contains_key(queue) {
            return Err(anyhow!("Queue {} is not declared", queue));
        }
        if state.consumers.contains_key(consumer_tag) {
            return Err(anyhow!("Consumer tag {} already in use", consumer_tag));
        }

        state.consumers.insert(consumer_tag.to_string(), 0);
        debug!(queue, consumer_tag, "In-memory consumer registered");

        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            queue: queue.to_string(),
            consumer: consumer_tag.to_string(),
        }))
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), Error> {
        let mut state = self.lock()?;

        if state.closed {
            return Err(anyhow!("Broker connection is closed"));
        }
        if state.rejected_queues.contains(queue) {
            return Err(anyhow!("Publish to {} rejected", queue));
        }

        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("Queue {} is not declared", queue))?;
        messages.push_back(StoredMessage {
            data: payload.to_vec(),
            redelivered: false,
        });
        state.journal.push(JournalEntry::Published {
            queue: queue.to_string(),
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        let mut state = self.lock()?;
        let entry = state.settle(delivery_tag)?;
        state.journal.push(JournalEntry::Acked {
            queue: entry.queue,
            consumer: entry.consumer,
            delivery_tag,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        let mut state = self.lock()?;
        let entry = state.settle(delivery_tag)?;

        if requeue {
            let mut message = entry.message;
            message.redelivered = true;
            if let Some(messages) = state.queues.get_mut(&entry.queue) {
                messages.push_front(message);
            }
        }

        state.journal.push(JournalEntry::Nacked {
            queue: entry.queue,
            consumer: entry.consumer,
            delivery_tag,
            requeue,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.lock_unchecked().closed
    }

    async fn close(&self) -> Result<(), Error> {
        let mut state = self.lock()?;
        state.closed = true;

        // Abandoned deliveries go back in tag order so each queue keeps its FIFO order.
        let mut abandoned: Vec<(u64, InFlight)> = state.in_flight.drain().collect();
        abandoned.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, entry) in abandoned {
            let mut message = entry.message;
            message.redelivered = true;
            if let Some(messages) = state.queues.get_mut(&entry.queue) {
                messages.push_front(message);
            }
        }
        state.consumers.clear();
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }
}

struct MemorySubscription {
    broker: InMemoryBroker,
    queue: String,
    consumer: String,
}

impl MemorySubscription {
    /// `None` when closed, `Some(None)` when nothing can be handed out yet.
    fn try_take(&self) -> Option<Option<Delivery>> {
        let mut state = self.broker.lock_unchecked();

        if state.closed {
            return None;
        }

        let held = state.consumers.get(&self.consumer).copied()?;
        if held >= self.broker.prefetch {
            return Some(None);
        }

        let message = state.queues.get_mut(&self.queue)?.pop_front();
        let Some(message) = message else {
            return Some(None);
        };

        state.next_tag += 1;
        let delivery_tag = state.next_tag;

        state.consumers.insert(self.consumer.clone(), held + 1);
        state.in_flight.insert(
            delivery_tag,
            InFlight {
                queue: self.queue.clone(),
                consumer: self.consumer.clone(),
                message: message.clone(),
            },
        );
        state.journal.push(JournalEntry::Delivered {
            queue: self.queue.clone(),
            consumer: self.consumer.clone(),
            delivery_tag,
        });

        Some(Some(Delivery {
            delivery_tag,
            data: message.data,
            redelivered: message.redelivered,
        }))
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, Error>> {
        loop {
            // Registered before the state check so a wakeup in between is not lost.
            let notified = self.broker.notify.notified();

            match self.try_take() {
                None => return None,
                Some(Some(delivery)) => return Some(Ok(delivery)),
                Some(None) => notified.await,
            }
        }
    }
}
