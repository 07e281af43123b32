use covenant_chain::{ActorId, ChainIntegrityError, ChainStoreError};
use thiserror::Error;

use crate::actor::ActorError;
use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors surfaced by the dispatcher and its [`RuntimeHandle`](crate::RuntimeHandle).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),

    #[error("actor already exists: {0}")]
    ActorAlreadyExists(ActorId),

    #[error(transparent)]
    Actor(#[from] ActorError),

    /// The actor's history can no longer be trusted.
    #[error("chain integrity failure for actor '{actor}': {source}")]
    Integrity {
        actor: ActorId,
        #[source]
        source: ChainIntegrityError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] ChainStoreError),

    #[error("runtime command channel closed")]
    ChannelClosed,
}
