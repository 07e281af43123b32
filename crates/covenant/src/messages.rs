//! Commands understood by the dispatcher and the envelopes actors exchange.

use covenant_chain::{ActorId, CommitRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::actor::{ActorStatus, Behavior, HttpResponse};
use crate::errors::RuntimeError;
use crate::metrics::ActorMetrics;

/// A message from one actor to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ActorId,
    pub to: ActorId,
    #[serde(with = "hex_payload")]
    pub message: Vec<u8>,
}

impl Envelope {
    pub fn new(from: ActorId, to: ActorId, message: Vec<u8>) -> Self {
        Self { from, to, message }
    }
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug)]
pub enum RuntimeCommand {
    SpawnActor {
        id: ActorId,
        behavior: Behavior,
        response_tx: oneshot::Sender<Result<CommitRecord, RuntimeError>>,
    },
    Deliver {
        to: ActorId,
        message: Vec<u8>,
        response_tx: oneshot::Sender<Result<CommitRecord, RuntimeError>>,
    },
    DeliverHttp {
        to: ActorId,
        request: Vec<u8>,
        response_tx: oneshot::Sender<Result<HttpResponse, RuntimeError>>,
    },
    /// An outbound send from a committed transition.
    Forward { envelope: Envelope },
    GetChain {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<Vec<CommitRecord>, RuntimeError>>,
    },
    VerifyChain {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<(), RuntimeError>>,
    },
    GetState {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<Option<Vec<u8>>, RuntimeError>>,
    },
    GetStatus {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<ActorStatus, RuntimeError>>,
    },
    GetMetrics {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<ActorMetrics, RuntimeError>>,
    },
    GetActors {
        response_tx: oneshot::Sender<Vec<ActorId>>,
    },
    StopActor {
        actor: ActorId,
        response_tx: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}

impl RuntimeCommand {
    pub fn to_log(&self) -> String {
        match self {
            RuntimeCommand::SpawnActor { id, .. } => format!("SpawnActor: {}", id),
            RuntimeCommand::Deliver { to, message, .. } => {
                format!("Deliver: {} ({} bytes)", to, message.len())
            }
            RuntimeCommand::DeliverHttp { to, request, .. } => {
                format!("DeliverHttp: {} ({} bytes)", to, request.len())
            }
            RuntimeCommand::Forward { envelope } => {
                format!("Forward: {} -> {}", envelope.from, envelope.to)
            }
            RuntimeCommand::GetChain { actor, .. } => format!("GetChain: {}", actor),
            RuntimeCommand::VerifyChain { actor, .. } => format!("VerifyChain: {}", actor),
            RuntimeCommand::GetState { actor, .. } => format!("GetState: {}", actor),
            RuntimeCommand::GetStatus { actor, .. } => format!("GetStatus: {}", actor),
            RuntimeCommand::GetMetrics { actor, .. } => format!("GetMetrics: {}", actor),
            RuntimeCommand::GetActors { .. } => "GetActors".to_string(),
            RuntimeCommand::StopActor { actor, .. } => format!("StopActor: {}", actor),
            RuntimeCommand::Shutdown { .. } => "Shutdown".to_string(),
        }
    }
}
