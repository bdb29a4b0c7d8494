use std::sync::Arc;

use anyhow::{Error, Result};
use notification_service::{
    clients::{broker::BrokerClient, rbmq::RabbitMqClient},
    config::Config,
    logging,
    service::NotificationService,
    shutdown::ShutdownSignal,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    logging::init(config.log_format)?;

    let mut signal = ShutdownSignal::install()?;

    let broker: Arc<dyn BrokerClient> = match RabbitMqClient::connect(&config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to start notification service");
            return Err(e);
        }
    };

    let service = NotificationService::from_config(&config, broker).spawn();

    info!("Notification service started successfully");

    service
        .run_until(async move {
            let name = signal.recv().await;
            info!(signal = name, "Termination signal received");
        })
        .await
}
