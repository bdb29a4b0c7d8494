use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use crate::{
    config::Config, error::PipelineError, models::message::Notification,
    worker::DeliveryBackend,
};

/// Stand-in for a push provider such as FCM.
pub struct SimulatedPushClient {
    delay: Duration,
}

impl SimulatedPushClient {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_millis(config.push_delivery_delay_ms))
    }
}

#[async_trait]
impl DeliveryBackend for SimulatedPushClient {
    async fn deliver(&self, notification: &Notification) -> Result<(), PipelineError> {
        let (title, body) = notification.push_content().ok_or_else(|| {
            PipelineError::Handler(format!(
                "{} is not a push notification",
                notification.kind()
            ))
        })?;

        info!(
            user_id = %notification.user_id(),
            title,
            body,
            sent_at = %Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "Sending push notification"
        );

        sleep(self.delay).await;

        debug!(notification_type = notification.kind(), "Push notification sent successfully");

        Ok(())
    }
}
