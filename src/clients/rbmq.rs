use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{error, info};

use crate::{
    clients::broker::{BrokerClient, Delivery, QueueTopology, Subscription},
    config::{Config, PREFETCH_COUNT},
};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    topology: QueueTopology,
    connected: Arc<AtomicBool>,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!(
            host = %config.rabbitmq_host,
            port = config.rabbitmq_port,
            "Connecting to RabbitMQ"
        );

        let connection = Connection::connect(&config.amqp_url(), ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        let topology = config.queue_topology();

        for queue in topology.all() {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

            info!(queue, "Queue declared");
        }

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        info!(prefetch_count = PREFETCH_COUNT, "Prefetch count set");

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        connection.on_error(move |err| {
            error!(error = %err, "RabbitMQ connection error");
            flag.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            connection,
            channel,
            topology,
            connected,
        })
    }

    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }
}

#[async_trait]
impl BrokerClient for RabbitMqClient {
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn Subscription>, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer on {}: {}", queue, e))?;

        info!(queue, consumer_tag, "Consumer created for queue");

        Ok(Box::new(LapinSubscription { consumer }))
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), Error> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message to {}: {}", queue, e))?;

        Ok(())
    }

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|e| anyhow!("Failed to nack message: {}", e))?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.connection.status().connected()
    }

    async fn close(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);

        self.connection
            .close(200, "Bye")
            .await
            .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {}", e))?;

        info!("RabbitMQ connection closed");

        Ok(())
    }
}

struct LapinSubscription {
    consumer: Consumer,
}

#[async_trait]
impl Subscription for LapinSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, Error>> {
        let delivery = self.consumer.next().await?;

        Some(
            delivery
                .map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    data: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .map_err(|e| anyhow!("Consumer stream failed: {}", e)),
        )
    }
}
