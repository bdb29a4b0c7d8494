use std::io;

use tokio::task::JoinSet;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{info, warn};

use crate::clients::broker::BrokerClient;

/// Listens for SIGINT and SIGTERM (Ctrl-C on other platforms).
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownSignal {
    /// Must be called from within a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves with the name of the first signal received.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
            }
            "ctrl-c"
        }
    }
}

/// Closes the broker connection and stops every consume loop without draining.
///
/// Whatever a loop holds unacknowledged at this point is redelivered by the
/// broker to the next consumer.
pub async fn abandon_in_flight<T: 'static>(broker: &dyn BrokerClient, tasks: &mut JoinSet<T>) {
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker connection cleanly");
    }

    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    info!("Consume loops stopped");
}
