//! # Covenant Chain
//!
//! The tamper-evident ledger behind every Covenant actor. Each accepted state
//! transition becomes a [`CommitRecord`] whose hash covers all of its fields,
//! including the hash of its parent, so a chain can be audited by recomputing
//! hashes forward from genesis.
//!
//! * [`Ledger`] holds one independent, linear chain per actor.
//! * [`audit`] / [`verify`] check a chain and name the first bad record.
//! * [`ChainFile`] persists a chain for offline audits.

pub mod chain;
pub mod clock;
pub mod error;
pub mod event;
pub mod file;
pub mod hash;
pub mod id;

pub use chain::{audit, verify, Ledger};
pub use clock::{Clock, LogicalClock, SystemClock};
pub use error::{ChainIntegrityError, ChainStoreError};
pub use event::{CommitRecord, EventData, EventType, PendingCommit};
pub use file::ChainFile;
pub use hash::{digest, ChainHash, HASH_LEN};
pub use id::ActorId;
