use std::{future::Future, sync::Arc};

use anyhow::{Error, Result, anyhow};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::{
    clients::{
        broker::{BrokerClient, QueueTopology},
        email::SimulatedEmailClient,
        push::SimulatedPushClient,
    },
    config::Config,
    dispatcher::Dispatcher,
    routing::RoutingTable,
    shutdown,
    worker::{DeliveryBackend, DeliveryWorker},
};

/// The dispatcher and both delivery workers, sharing one broker client.
pub struct NotificationService {
    broker: Arc<dyn BrokerClient>,
    dispatcher: Arc<Dispatcher>,
    workers: Vec<Arc<DeliveryWorker>>,
}

impl NotificationService {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        topology: QueueTopology,
        routing: RoutingTable,
        email_backend: Arc<dyn DeliveryBackend>,
        push_backend: Arc<dyn DeliveryBackend>,
    ) -> Self {
        let email_worker = DeliveryWorker::new(
            "email_worker",
            topology.email.clone(),
            Arc::clone(&broker),
            email_backend,
        );
        let push_worker = DeliveryWorker::new(
            "push_worker",
            topology.push.clone(),
            Arc::clone(&broker),
            push_backend,
        );
        let dispatcher = Dispatcher::new(Arc::clone(&broker), topology, routing);

        Self {
            broker,
            dispatcher: Arc::new(dispatcher),
            workers: vec![Arc::new(email_worker), Arc::new(push_worker)],
        }
    }

    /// Default routing and the simulated email/push providers.
    pub fn from_config(config: &Config, broker: Arc<dyn BrokerClient>) -> Self {
        Self::new(
            broker,
            config.queue_topology(),
            RoutingTable::default(),
            Arc::new(SimulatedEmailClient::from_config(config)),
            Arc::new(SimulatedPushClient::from_config(config)),
        )
    }

    /// Starts the three consume loops.
    pub fn spawn(self) -> RunningService {
        let mut tasks = JoinSet::new();

        let dispatcher = Arc::clone(&self.dispatcher);
        tasks.spawn(async move { ("dispatcher".to_string(), dispatcher.run().await) });

        for worker in self.workers {
            tasks.spawn(async move { (worker.name().to_string(), worker.run().await) });
        }

        RunningService {
            broker: self.broker,
            tasks,
        }
    }
}

pub struct RunningService {
    broker: Arc<dyn BrokerClient>,
    tasks: JoinSet<(String, Result<(), Error>)>,
}

impl RunningService {
    /// Runs until `signal` resolves or a consume loop stops, whichever comes first.
    ///
    /// A loop stopping on its own means the connection is gone, which is fatal.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let exited = tokio::select! {
            _ = signal => None,
            joined = self.tasks.join_next() => Some(joined),
        };

        let Some(joined) = exited else {
            info!("Shutting down notification service");
            shutdown::abandon_in_flight(self.broker.as_ref(), &mut self.tasks).await;
            return Ok(());
        };

        let failure = match joined {
            Some(Ok((name, Err(e)))) => anyhow!("{} stopped: {}", name, e),
            Some(Ok((name, Ok(())))) => anyhow!("{} stopped unexpectedly", name),
            Some(Err(e)) => anyhow!("Consume loop panicked: {}", e),
            None => anyhow!("No consume loops running"),
        };

        error!(error = %failure, "Notification service failed");
        shutdown::abandon_in_flight(self.broker.as_ref(), &mut self.tasks).await;

        Err(failure)
    }
}
