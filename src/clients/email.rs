use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use crate::{
    config::Config, error::PipelineError, models::message::Notification,
    worker::DeliveryBackend,
};

/// Stand-in for an email provider: logs the message and waits out a fixed latency.
pub struct SimulatedEmailClient {
    delay: Duration,
}

impl SimulatedEmailClient {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_millis(config.email_delivery_delay_ms))
    }
}

#[async_trait]
impl DeliveryBackend for SimulatedEmailClient {
    async fn deliver(&self, notification: &Notification) -> Result<(), PipelineError> {
        let subject = notification.email_subject().ok_or_else(|| {
            PipelineError::Handler(format!(
                "{} is not an email notification",
                notification.kind()
            ))
        })?;

        info!(
            notification_type = notification.kind(),
            user_id = %notification.user_id(),
            subject = %subject,
            sent_at = %Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "Sending email"
        );

        sleep(self.delay).await;

        debug!(notification_type = notification.kind(), "Email sent successfully");

        Ok(())
    }
}
