use std::fmt::{Display, Formatter, Result};

/// What the dispatcher did with one inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// All derived messages were enqueued and the event was acknowledged.
    Forwarded(usize),
    /// Well-formed event of a type with no routes; acknowledged.
    Ignored,
    /// Malformed body; nacked without requeue.
    Poisoned,
    /// At least one derived message could not be enqueued; the event was nacked.
    EnqueueFailed,
}

/// Terminal state of a message handed to a delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped,
    Requeued,
}

impl Display for DispatchOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DispatchOutcome::Forwarded(count) => write!(f, "forwarded({})", count),
            DispatchOutcome::Ignored => write!(f, "ignored"),
            DispatchOutcome::Poisoned => write!(f, "poisoned"),
            DispatchOutcome::EnqueueFailed => write!(f, "enqueue_failed"),
        }
    }
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Dropped => write!(f, "dropped"),
            DeliveryOutcome::Requeued => write!(f, "requeued"),
        }
    }
}
