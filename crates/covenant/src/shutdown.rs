use std::time::Duration;
use tokio::sync::oneshot::{self, Receiver, Sender};
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long `signal_shutdown` waits for each subscriber to acknowledge.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownType {
    /// Finish queued work before stopping.
    Graceful,
    /// Stop now; queued work is abandoned.
    Force,
}

/// Delivered to each subscriber. Dropping it counts as an acknowledgement.
#[derive(Debug)]
pub struct ShutdownSignal {
    pub shutdown_type: ShutdownType,
    ack: Option<Sender<()>>,
}

impl ShutdownSignal {
    /// Tells the controller this component has stopped.
    pub fn acknowledge(mut self) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(());
        }
    }
}

/// Signals a set of components to stop and waits for each to finish.
#[derive(Debug, Default)]
pub struct ShutdownController {
    subscribers: Vec<Sender<ShutdownSignal>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> ShutdownReceiver {
        let (sender, receiver) = oneshot::channel();
        self.subscribers.push(sender);
        ShutdownReceiver { receiver }
    }

    pub async fn signal_shutdown(self, shutdown_type: ShutdownType) {
        debug!(
            "Signaling {:?} shutdown to {} subscribers",
            shutdown_type,
            self.subscribers.len()
        );
        let mut acks = Vec::new();
        for sender in self.subscribers {
            let (ack_tx, ack_rx) = oneshot::channel();
            let signal = ShutdownSignal {
                shutdown_type,
                ack: Some(ack_tx),
            };
            if sender.send(signal).is_ok() {
                acks.push(ack_rx);
            } else {
                debug!("Shutdown subscriber already gone");
            }
        }

        for ack in acks {
            if timeout(DEFAULT_SHUTDOWN_TIMEOUT, ack).await.is_err() {
                warn!(
                    "Subscriber did not acknowledge shutdown within {:?}",
                    DEFAULT_SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

#[derive(Debug)]
pub struct ShutdownReceiver {
    receiver: Receiver<ShutdownSignal>,
}

impl ShutdownReceiver {
    /// Resolves once shutdown is signalled. If the controller is dropped
    /// without signalling this never resolves, leaving the component to stop
    /// on its own terms. Must not be polled again after it resolves.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        match (&mut self.receiver).await {
            Ok(signal) => {
                debug!("Received {:?} shutdown signal", signal.shutdown_type);
                signal
            }
            Err(_) => {
                debug!("Shutdown controller dropped without signalling");
                std::future::pending().await
            }
        }
    }
}
