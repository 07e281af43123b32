//! # Hash Chain Ledger
//!
//! Append-only storage for every actor's chain of commits. Each actor owns an
//! independent chain; records are kept in an arena indexed by position and link to
//! their predecessor by hash only, so the chain is a logical order rather than a
//! pointer structure.
//!
//! Appends for one actor are serialized by that actor's own lock. Appends for
//! different actors never contend beyond the brief registry lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::error::ChainIntegrityError;
use crate::event::{CommitRecord, EventType, PendingCommit};
use crate::hash::ChainHash;
use crate::id::ActorId;

/// The records of a single actor, oldest first.
#[derive(Debug, Default)]
pub struct ActorChain {
    records: Vec<CommitRecord>,
    positions: HashMap<ChainHash, usize>,
}

impl ActorChain {
    fn tip(&self) -> Option<&CommitRecord> {
        self.records.last()
    }

    fn push(&mut self, record: CommitRecord) {
        self.positions.insert(record.hash, self.records.len());
        self.records.push(record);
    }
}

/// The ledger holding every actor's chain.
#[derive(Debug)]
pub struct Ledger {
    chains: RwLock<HashMap<ActorId, Arc<Mutex<ActorChain>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Creates a ledger stamping commits with wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn chain_for(&self, actor: &ActorId) -> Arc<Mutex<ActorChain>> {
        if let Some(chain) = self
            .chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor)
        {
            return chain.clone();
        }
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(actor.clone())
            .or_default()
            .clone()
    }

    fn existing_chain(&self, actor: &ActorId) -> Option<Arc<Mutex<ActorChain>>> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor)
            .cloned()
    }

    fn lock(chain: &Mutex<ActorChain>) -> MutexGuard<'_, ActorChain> {
        chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seals a pending commit onto the tip of its actor's chain.
    ///
    /// Reading the tip, stamping the time, hashing and storing the record happen
    /// under the actor's lock, so two appends can never extend the same tip.
    /// Appending never rejects: every [`PendingCommit`] is well formed by
    /// construction, and all contract checks happen before it is built.
    pub fn append(&self, pending: PendingCommit) -> CommitRecord {
        let chain = self.chain_for(&pending.actor);
        let mut chain = Self::lock(&chain);

        let (parent_hash, floor) = match chain.tip() {
            Some(tip) => (tip.hash, Some(tip.timestamp)),
            None => (ChainHash::GENESIS, None),
        };
        let mut timestamp = self.clock.now();
        if let Some(floor) = floor {
            timestamp = timestamp.max(floor);
        }

        let record = CommitRecord::seal(parent_hash, timestamp, pending);
        debug!(
            "actor [{}]: sealed {} commit {} (parent {})",
            record.actor,
            record.event_type,
            record.hash.short(),
            record.parent_hash.short()
        );
        chain.push(record.clone());
        record
    }

    /// Hash of the actor's latest commit, if it has any.
    pub fn tip(&self, actor: &ActorId) -> Option<ChainHash> {
        let chain = self.existing_chain(actor)?;
        let chain = Self::lock(&chain);
        chain.tip().map(|record| record.hash)
    }

    /// Hash a new commit for the actor would link to.
    pub fn tip_or_genesis(&self, actor: &ActorId) -> ChainHash {
        self.tip(actor).unwrap_or(ChainHash::GENESIS)
    }

    /// A snapshot of the actor's chain, oldest first.
    pub fn chain(&self, actor: &ActorId) -> Vec<CommitRecord> {
        match self.existing_chain(actor) {
            Some(chain) => Self::lock(&chain).records.clone(),
            None => Vec::new(),
        }
    }

    pub fn len(&self, actor: &ActorId) -> usize {
        match self.existing_chain(actor) {
            Some(chain) => Self::lock(&chain).records.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self, actor: &ActorId) -> bool {
        self.len(actor) == 0
    }

    /// Looks up a commit of the actor by its hash.
    pub fn get(&self, actor: &ActorId, hash: &ChainHash) -> Option<CommitRecord> {
        let chain = self.existing_chain(actor)?;
        let chain = Self::lock(&chain);
        chain
            .positions
            .get(hash)
            .and_then(|position| chain.records.get(*position))
            .cloned()
    }

    /// Actors that have at least one commit.
    pub fn actors(&self) -> Vec<ActorId> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let mut actors: Vec<ActorId> = chains
            .iter()
            .filter(|(_, chain)| !Self::lock(chain).records.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        actors.sort();
        actors
    }

    /// Audits the actor's stored chain from genesis.
    pub fn verify_actor(&self, actor: &ActorId) -> Result<(), ChainIntegrityError> {
        let records = self.chain(actor);
        audit(&records).inspect_err(|e| {
            error!("actor [{}]: chain integrity failure: {}", actor, e);
        })
    }
}

/// Recomputes every hash from genesis and checks every parent link.
///
/// Returns the first offending record. An empty chain is trivially valid.
pub fn audit(records: &[CommitRecord]) -> Result<(), ChainIntegrityError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let actor = &first.actor;
    let mut expected_parent = ChainHash::GENESIS;

    for (index, record) in records.iter().enumerate() {
        if &record.actor != actor {
            return Err(ChainIntegrityError::ForeignRecord {
                index,
                hash: record.hash,
                expected: actor.clone(),
                found: record.actor.clone(),
            });
        }

        let computed = record.compute_hash();
        if computed != record.hash {
            return Err(ChainIntegrityError::HashMismatch {
                index,
                hash: record.hash,
                computed,
            });
        }

        if record.parent_hash != expected_parent {
            if index > 0 && record.parent_hash.is_genesis() {
                return Err(ChainIntegrityError::MisplacedGenesis {
                    index,
                    hash: record.hash,
                });
            }
            return Err(ChainIntegrityError::ParentMismatch {
                index,
                hash: record.hash,
                expected: expected_parent,
                found: record.parent_hash,
            });
        }

        let type_in_place = match record.event_type {
            EventType::Init => index == 0,
            EventType::MessageHandled | EventType::HttpHandled => index > 0,
            EventType::ContractRejected => false,
        };
        if !type_in_place || record.event_type != record.data.event_type() {
            return Err(ChainIntegrityError::UnexpectedEvent {
                index,
                hash: record.hash,
                event_type: record.event_type,
            });
        }

        expected_parent = record.hash;
    }

    Ok(())
}

/// Boolean form of [`audit`].
pub fn verify(records: &[CommitRecord]) -> bool {
    audit(records).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LogicalClock;
    use crate::event::EventData;

    fn ledger() -> Ledger {
        Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch()))
    }

    fn init(actor: &str, state: &[u8]) -> PendingCommit {
        PendingCommit::new(
            ActorId::from(actor),
            EventData::Init {
                state: state.to_vec(),
            },
        )
    }

    fn handled(actor: &str, message: &[u8], state: &[u8]) -> PendingCommit {
        PendingCommit::new(
            ActorId::from(actor),
            EventData::MessageHandled {
                message: message.to_vec(),
                state: state.to_vec(),
            },
        )
    }

    #[test]
    fn test_first_commit_links_to_genesis() {
        let ledger = ledger();
        let actor = ActorId::from("a");
        assert_eq!(ledger.tip(&actor), None);
        assert_eq!(ledger.tip_or_genesis(&actor), ChainHash::GENESIS);

        let record = ledger.append(init("a", &[0]));
        assert_eq!(record.parent_hash, ChainHash::GENESIS);
        assert_eq!(ledger.tip(&actor), Some(record.hash));
        assert_eq!(ledger.len(&actor), 1);
    }

    #[test]
    fn test_commits_link_to_previous_tip() {
        let ledger = ledger();
        let first = ledger.append(init("a", &[0]));
        let second = ledger.append(handled("a", &[1], &[0, 1]));
        let third = ledger.append(handled("a", &[2], &[0, 1, 2]));

        assert_eq!(second.parent_hash, first.hash);
        assert_eq!(third.parent_hash, second.hash);
        assert!(verify(&ledger.chain(&ActorId::from("a"))));
        assert_eq!(ledger.get(&ActorId::from("a"), &second.hash), Some(second));
    }

    #[test]
    fn test_chains_are_independent_per_actor() {
        let ledger = ledger();
        let a = ledger.append(init("a", &[0]));
        let b = ledger.append(init("b", &[0]));
        assert!(a.is_genesis());
        assert!(b.is_genesis());
        ledger.append(handled("a", &[1], &[1]));
        assert_eq!(ledger.len(&ActorId::from("a")), 2);
        assert_eq!(ledger.len(&ActorId::from("b")), 1);
        assert_eq!(ledger.actors(), vec![ActorId::from("a"), ActorId::from("b")]);
    }

    #[test]
    fn test_audit_detects_reordering() {
        let ledger = ledger();
        ledger.append(init("a", &[0]));
        ledger.append(handled("a", &[1], &[1]));
        ledger.append(handled("a", &[2], &[2]));
        let mut records = ledger.chain(&ActorId::from("a"));
        records.swap(1, 2);

        let err = audit(&records).unwrap_err();
        assert_eq!(err.index(), 1);
        assert!(matches!(err, ChainIntegrityError::ParentMismatch { .. }));
    }

    #[test]
    fn test_audit_detects_fork() {
        let ledger = ledger();
        let root = ledger.append(init("a", &[0]));
        let child = ledger.append(handled("a", &[1], &[1]));
        // A sibling of `child`, sealed against the same parent.
        let sibling = CommitRecord::seal(root.hash, child.timestamp, handled("a", &[9], &[9]));

        let forked = vec![root, child, sibling.clone()];
        let err = audit(&forked).unwrap_err();
        assert_eq!(err.index(), 2);
        assert_eq!(err.hash(), sibling.hash);
    }

    #[test]
    fn test_audit_detects_foreign_record() {
        let ledger = ledger();
        let mut records = vec![ledger.append(init("a", &[0]))];
        records.push(ledger.append(init("b", &[0])));
        assert!(matches!(
            audit(&records),
            Err(ChainIntegrityError::ForeignRecord { index: 1, .. })
        ));
    }

    #[test]
    fn test_audit_detects_misplaced_genesis() {
        let ledger = ledger();
        let first = ledger.append(init("a", &[0]));
        let again = CommitRecord::seal(ChainHash::GENESIS, first.timestamp, handled("a", &[1], &[1]));
        assert!(matches!(
            audit(&[first, again]),
            Err(ChainIntegrityError::MisplacedGenesis { index: 1, .. })
        ));
    }

    #[test]
    fn test_audit_requires_init_first() {
        let ledger = ledger();
        let record = ledger.append(handled("a", &[1], &[1]));
        assert!(matches!(
            audit(&[record]),
            Err(ChainIntegrityError::UnexpectedEvent { index: 0, .. })
        ));
    }

    #[test]
    fn test_timestamps_never_decrease_along_a_chain() {
        let ledger = Ledger::new();
        ledger.append(init("a", &[0]));
        for i in 0..20u8 {
            ledger.append(handled("a", &[i], &[i]));
        }
        let records = ledger.chain(&ActorId::from("a"));
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_concurrent_appends_across_actors() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    let name = format!("actor-{}", n);
                    ledger.append(init(&name, &[0]));
                    for i in 0..50u8 {
                        ledger.append(handled(&name, &[i], &[i]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for actor in ledger.actors() {
            let records = ledger.chain(&actor);
            assert_eq!(records.len(), 51);
            assert!(verify(&records));
        }
    }
}
