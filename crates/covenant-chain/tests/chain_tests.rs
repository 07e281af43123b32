use std::sync::Arc;

use covenant_chain::{
    audit, verify, ActorId, ChainHash, ChainIntegrityError, EventData, EventType, Ledger,
    LogicalClock, PendingCommit,
};
use pretty_assertions::assert_eq;

fn append_sequence(ledger: &Ledger, actor: &ActorId) {
    ledger.append(PendingCommit::new(
        actor.clone(),
        EventData::Init { state: vec![0] },
    ));
    ledger.append(PendingCommit::new(
        actor.clone(),
        EventData::MessageHandled {
            message: vec![1],
            state: vec![0, 1],
        },
    ));
    ledger.append(PendingCommit::new(
        actor.clone(),
        EventData::MessageHandled {
            message: vec![2],
            state: vec![0, 1, 2],
        },
    ));
}

#[test]
fn test_every_stored_hash_recomputes() {
    let ledger = Ledger::new();
    let actor = ActorId::from("counter");
    append_sequence(&ledger, &actor);

    let records = ledger.chain(&actor);
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.compute_hash(), record.hash);
    }
    assert_eq!(
        records.iter().map(|r| r.event_type).collect::<Vec<_>>(),
        vec![
            EventType::Init,
            EventType::MessageHandled,
            EventType::MessageHandled
        ]
    );
    assert!(verify(&records));
}

#[test]
fn test_tampered_middle_record_is_identified() {
    let ledger = Ledger::new();
    let actor = ActorId::from("counter");
    append_sequence(&ledger, &actor);

    let mut records = ledger.chain(&actor);
    records[1].data = EventData::MessageHandled {
        message: vec![1],
        state: vec![0, 7],
    };
    assert!(!verify(&records));

    match audit(&records) {
        Err(ChainIntegrityError::HashMismatch { index, hash, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(hash, records[1].hash);
        }
        other => panic!("expected hash mismatch, got {:?}", other),
    }

    // Re-sealing the edited record moves the break to its child.
    records[1].hash = records[1].compute_hash();
    assert!(matches!(
        audit(&records),
        Err(ChainIntegrityError::ParentMismatch { index: 2, .. })
    ));
}

#[test]
fn test_identical_inputs_produce_identical_chains() {
    let actor = ActorId::from("counter");
    let first = Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch()));
    let second = Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch()));
    append_sequence(&first, &actor);
    append_sequence(&second, &actor);

    let a: Vec<ChainHash> = first.chain(&actor).iter().map(|r| r.hash).collect();
    let b: Vec<ChainHash> = second.chain(&actor).iter().map(|r| r.hash).collect();
    assert_eq!(a, b);
}

#[test]
fn test_each_record_has_at_most_one_child() {
    let ledger = Ledger::new();
    let actor = ActorId::from("counter");
    append_sequence(&ledger, &actor);
    let records = ledger.chain(&actor);

    for record in &records {
        let children = records
            .iter()
            .filter(|r| r.parent_hash == record.hash)
            .count();
        assert!(children <= 1);
    }
    for record in records.iter().skip(1) {
        let parents = records
            .iter()
            .filter(|r| r.hash == record.parent_hash)
            .count();
        assert_eq!(parents, 1);
    }
}
