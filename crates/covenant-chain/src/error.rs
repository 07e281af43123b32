use crate::event::EventType;
use crate::hash::ChainHash;
use crate::id::ActorId;

/// An audit found a chain whose history can no longer be trusted.
///
/// Every variant names the offending record by position and stored hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainIntegrityError {
    #[error("record #{index} ({hash}) does not match its contents (recomputed {computed})")]
    HashMismatch {
        index: usize,
        hash: ChainHash,
        computed: ChainHash,
    },

    #[error("record #{index} ({hash}) links to parent {found}, expected {expected}")]
    ParentMismatch {
        index: usize,
        hash: ChainHash,
        expected: ChainHash,
        found: ChainHash,
    },

    #[error("record #{index} ({hash}) claims genesis but is not the first record")]
    MisplacedGenesis { index: usize, hash: ChainHash },

    #[error("record #{index} ({hash}) belongs to actor '{found}', chain is for '{expected}'")]
    ForeignRecord {
        index: usize,
        hash: ChainHash,
        expected: ActorId,
        found: ActorId,
    },

    #[error("record #{index} ({hash}) has event type {event_type} out of place")]
    UnexpectedEvent {
        index: usize,
        hash: ChainHash,
        event_type: EventType,
    },
}

impl ChainIntegrityError {
    /// Position of the offending record within the audited chain.
    pub fn index(&self) -> usize {
        match self {
            Self::HashMismatch { index, .. }
            | Self::ParentMismatch { index, .. }
            | Self::MisplacedGenesis { index, .. }
            | Self::ForeignRecord { index, .. }
            | Self::UnexpectedEvent { index, .. } => *index,
        }
    }

    /// Stored hash of the offending record.
    pub fn hash(&self) -> ChainHash {
        match self {
            Self::HashMismatch { hash, .. }
            | Self::ParentMismatch { hash, .. }
            | Self::MisplacedGenesis { hash, .. }
            | Self::ForeignRecord { hash, .. }
            | Self::UnexpectedEvent { hash, .. } => *hash,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainStoreError {
    #[error("failed to access chain file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode chain file: {0}")]
    Json(#[from] serde_json::Error),
}
