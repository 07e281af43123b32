//! Commit records and their canonical encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{digest, hex_bytes, ChainHash};
use crate::id::ActorId;

const DOMAIN_TAG: &[u8] = b"covenant/commit/v1";

/// The kind of event a record describes.
///
/// `ContractRejected` is only ever rendered as a supplementary log entry; there is
/// no [`EventData`] variant for it, so a rejection can never be chained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Init,
    MessageHandled,
    HttpHandled,
    ContractRejected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Init => "INIT",
            EventType::MessageHandled => "MESSAGE_HANDLED",
            EventType::HttpHandled => "HTTP_HANDLED",
            EventType::ContractRejected => "CONTRACT_REJECTED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event-specific payload of a commit.
///
/// Full state and input bytes are kept so a chain can be replayed and any
/// historical state reconstructed from the ledger alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventData {
    Init {
        #[serde(with = "hex_bytes")]
        state: Vec<u8>,
    },
    MessageHandled {
        #[serde(with = "hex_bytes")]
        message: Vec<u8>,
        #[serde(with = "hex_bytes")]
        state: Vec<u8>,
    },
    HttpHandled {
        #[serde(with = "hex_bytes")]
        request: Vec<u8>,
        response_digest: ChainHash,
        #[serde(with = "hex_bytes")]
        state: Vec<u8>,
    },
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::Init { .. } => EventType::Init,
            EventData::MessageHandled { .. } => EventType::MessageHandled,
            EventData::HttpHandled { .. } => EventType::HttpHandled,
        }
    }

    /// The state that became current when this event was committed.
    pub fn state(&self) -> &[u8] {
        match self {
            EventData::Init { state }
            | EventData::MessageHandled { state, .. }
            | EventData::HttpHandled { state, .. } => state,
        }
    }

    /// The message or request bytes that triggered the transition, if any.
    pub fn input(&self) -> Option<&[u8]> {
        match self {
            EventData::Init { .. } => None,
            EventData::MessageHandled { message, .. } => Some(message),
            EventData::HttpHandled { request, .. } => Some(request),
        }
    }

    fn encode_into(&self, encoder: &mut CanonicalEncoder) {
        match self {
            EventData::Init { state } => {
                encoder.field(state);
            }
            EventData::MessageHandled { message, state } => {
                encoder.field(message);
                encoder.field(state);
            }
            EventData::HttpHandled {
                request,
                response_digest,
                state,
            } => {
                encoder.field(request);
                encoder.field(response_digest.as_bytes());
                encoder.field(state);
            }
        }
    }
}

/// A record that has not been sealed yet: the ledger supplies the parent hash,
/// the timestamp and the hash itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub actor: ActorId,
    pub data: EventData,
}

impl PendingCommit {
    pub fn new(actor: ActorId, data: EventData) -> Self {
        Self { actor, data }
    }
}

/// One sealed, immutable link of an actor's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Hash of the canonical encoding of every other field.
    pub hash: ChainHash,
    /// Hash of the preceding commit, or [`ChainHash::GENESIS`] for the first one.
    pub parent_hash: ChainHash,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorId,
    pub event_type: EventType,
    pub data: EventData,
}

impl CommitRecord {
    pub(crate) fn seal(parent_hash: ChainHash, timestamp: DateTime<Utc>, pending: PendingCommit) -> Self {
        let event_type = pending.data.event_type();
        let mut record = Self {
            hash: ChainHash::GENESIS,
            parent_hash,
            timestamp,
            actor: pending.actor,
            event_type,
            data: pending.data,
        };
        record.hash = record.compute_hash();
        record
    }

    /// Recomputes the hash from the record's fields, ignoring the stored `hash`.
    pub fn compute_hash(&self) -> ChainHash {
        let mut encoder = CanonicalEncoder::new();
        encoder.field(self.parent_hash.as_bytes());
        let mut ts = Vec::with_capacity(12);
        ts.extend_from_slice(&self.timestamp.timestamp().to_be_bytes());
        ts.extend_from_slice(&self.timestamp.timestamp_subsec_nanos().to_be_bytes());
        encoder.field(&ts);
        encoder.field(self.actor.as_str().as_bytes());
        encoder.field(self.event_type.as_str().as_bytes());
        self.data.encode_into(&mut encoder);
        digest(&encoder.finish())
    }

    /// True when the stored hash matches a recomputation from the fields.
    pub fn is_intact(&self) -> bool {
        self.compute_hash() == self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_hash.is_genesis()
    }
}

/// Length-prefixed field encoding; unambiguous for any field contents.
struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    fn new() -> Self {
        let mut encoder = Self { buf: Vec::new() };
        encoder.field(DOMAIN_TAG);
        encoder
    }

    fn field(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(parent: ChainHash) -> CommitRecord {
        let ts = Utc.timestamp_opt(1_700_000_000, 42).unwrap();
        CommitRecord::seal(
            parent,
            ts,
            PendingCommit::new(
                ActorId::from("counter"),
                EventData::MessageHandled {
                    message: vec![1],
                    state: vec![0, 1],
                },
            ),
        )
    }

    #[test]
    fn test_seal_sets_event_type_and_hash() {
        let record = sample(ChainHash::GENESIS);
        assert_eq!(record.event_type, EventType::MessageHandled);
        assert!(record.is_intact());
        assert!(record.is_genesis());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = sample(ChainHash::GENESIS);

        let mut other = base.clone();
        other.parent_hash = digest(b"elsewhere");
        assert_ne!(other.compute_hash(), base.hash);

        let mut other = base.clone();
        other.timestamp = other.timestamp + chrono::Duration::nanoseconds(1);
        assert_ne!(other.compute_hash(), base.hash);

        let mut other = base.clone();
        other.actor = ActorId::from("counter2");
        assert_ne!(other.compute_hash(), base.hash);

        let mut other = base.clone();
        other.event_type = EventType::HttpHandled;
        assert_ne!(other.compute_hash(), base.hash);

        let mut other = base.clone();
        other.data = EventData::MessageHandled {
            message: vec![1],
            state: vec![0, 2],
        };
        assert_ne!(other.compute_hash(), base.hash);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        let a = CommitRecord::seal(
            ChainHash::GENESIS,
            ts,
            PendingCommit::new(
                ActorId::from("a"),
                EventData::MessageHandled {
                    message: vec![1, 2],
                    state: vec![3],
                },
            ),
        );
        let b = CommitRecord::seal(
            ChainHash::GENESIS,
            ts,
            PendingCommit::new(
                ActorId::from("a"),
                EventData::MessageHandled {
                    message: vec![1],
                    state: vec![2, 3],
                },
            ),
        );
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_json_round_trip_keeps_hash_valid() {
        let record = sample(digest(b"parent"));
        let json = serde_json::to_string(&record).unwrap();
        let back: CommitRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.is_intact());
    }

    #[test]
    fn test_event_type_tags() {
        assert_eq!(EventType::Init.to_string(), "INIT");
        assert_eq!(EventType::MessageHandled.to_string(), "MESSAGE_HANDLED");
        assert_eq!(EventType::HttpHandled.to_string(), "HTTP_HANDLED");
        assert_eq!(EventType::ContractRejected.to_string(), "CONTRACT_REJECTED");
    }
}
