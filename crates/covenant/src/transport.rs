//! Delivery of outbound sends to actors this runtime does not host.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::messages::Envelope;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no route to actor '{target}': {reason}")]
pub struct TransportError {
    pub target: String,
    pub reason: String,
}

pub trait Transport: Send + Sync {
    /// Hands off an envelope. Must not block the dispatcher.
    fn forward(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Discards everything addressed outside the runtime.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn forward(&self, envelope: Envelope) -> Result<(), TransportError> {
        warn!(
            "Discarding message from {} to unknown actor {}",
            envelope.from, envelope.to
        );
        Err(TransportError {
            target: envelope.to.to_string(),
            reason: "no transport configured".to_string(),
        })
    }
}

/// Forwards envelopes into a channel, for bridging to another runtime.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn forward(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx.send(envelope).map_err(|e| TransportError {
            target: e.0.to.to_string(),
            reason: "transport channel closed".to_string(),
        })
    }
}
