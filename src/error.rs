use std::fmt::Display;

use thiserror::Error;

/// Per-message failures, classified by how the pipeline reacts to them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The broker is unreachable or the connection dropped. Fatal for the service.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// The body is not a usable event or notification. The message is dropped.
    #[error("Malformed message: {0}")]
    Decode(String),

    /// The delivery backend failed.
    #[error("Delivery failed: {0}")]
    Handler(String),

    #[error("Failed to enqueue onto {queue}: {reason}")]
    Enqueue { queue: String, reason: String },
}

impl PipelineError {
    pub fn enqueue(queue: &str, reason: impl Display) -> Self {
        PipelineError::Enqueue {
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_field(event_type: &str, field: &str) -> Self {
        PipelineError::Decode(format!("{} event is missing `{}`", event_type, field))
    }

    pub fn mistyped_field(event_type: &str, field: &str, expected: &str) -> Self {
        PipelineError::Decode(format!(
            "{} event has `{}` that is not {}",
            event_type, field, expected
        ))
    }
}
