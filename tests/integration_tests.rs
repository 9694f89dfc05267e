use chronica::{Chronica, ChronicaError, ManualClock, Payload, Timestamp, Value};
use std::sync::Arc;

fn payload(name: &str, version: i64) -> Payload {
    Payload::new()
        .with("name", name)
        .with("version", Value::Int(version))
}

fn fixture() -> (Chronica, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(100)));
    let db = Chronica::builder().clock(clock.clone()).build().unwrap();
    (db, clock)
}

#[test]
fn test_basic_operations() {
    let db = Chronica::memory().unwrap();

    db.insert("user:1", payload("ada", 1)).unwrap();
    let live = db.get("user:1").unwrap().unwrap();
    assert_eq!(live.payload.get("name"), Some(&Value::Text("ada".into())));
    assert!(live.is_open());

    let closed = db.delete("user:1").unwrap();
    assert!(!closed.is_open());
    assert!(db.get("user:1").unwrap().is_none());
}

// Single entity through insert, two updates, delete: four versions, a
// contiguous chain, and as-of answers at every phase.
#[test]
fn test_entity_lifecycle_audit_trail() {
    let (db, clock) = fixture();

    db.insert("user:1", payload("ada", 1)).unwrap();
    clock.set(Timestamp::from_secs(200));
    db.update("user:1", payload("ada", 2)).unwrap();
    clock.set(Timestamp::from_secs(300));
    db.update("user:1", payload("ada", 3)).unwrap();
    clock.set(Timestamp::from_secs(400));
    db.delete("user:1").unwrap();

    let chain = db.versions("user:1").unwrap().into_vec();
    assert_eq!(chain.len(), 3);
    for pair in chain.windows(2) {
        assert_eq!(pair[0].valid_to, pair[1].valid_from);
    }
    assert_eq!(chain[2].valid_to, Timestamp::from_secs(400));

    for (secs, version) in [(150, 1), (250, 2), (350, 3)] {
        let v = db
            .version_as_of("user:1", Timestamp::from_secs(secs))
            .unwrap()
            .unwrap();
        assert_eq!(v.payload.get("version"), Some(&Value::Int(version)));
    }
    assert!(db
        .version_as_of("user:1", Timestamp::from_secs(450))
        .unwrap()
        .is_none());
    assert!(db
        .version_as_of("user:1", Timestamp::from_secs(50))
        .unwrap()
        .is_none());
}

#[test]
fn test_as_of_snapshot_across_entities() {
    let (db, clock) = fixture();

    db.insert("a", payload("a", 1)).unwrap();
    clock.set(Timestamp::from_secs(200));
    db.insert("b", payload("b", 1)).unwrap();
    clock.set(Timestamp::from_secs(300));
    db.update("a", payload("a", 2)).unwrap();
    db.delete("b").unwrap();

    // At t=250 both entities are alive in their first versions.
    let snapshot = db.query_as_of(Timestamp::from_secs(250)).unwrap();
    assert_eq!(snapshot.len(), 2);
    for v in snapshot.iter() {
        assert_eq!(v.payload.get("version"), Some(&Value::Int(1)));
    }

    // At t=350 only `a` survives, in its second version.
    let snapshot = db.query_as_of(Timestamp::from_secs(350)).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.iter().next().unwrap().entity_key.as_ref(), b"a");
}

#[test]
fn test_between_range_scan() {
    let (db, clock) = fixture();

    db.insert("a", payload("a", 1)).unwrap();
    clock.set(Timestamp::from_secs(200));
    db.update("a", payload("a", 2)).unwrap();
    clock.set(Timestamp::from_secs(300));
    db.insert("b", payload("b", 1)).unwrap();

    // [150, 250] intersects both versions of `a`, but `b` does not exist yet.
    let scan = db
        .query_between(Timestamp::from_secs(150), Timestamp::from_secs(250))
        .unwrap();
    assert_eq!(scan.len(), 2);
    assert!(scan.iter().all(|v| v.entity_key.as_ref() == b"a"));

    // A range touching everything returns all three versions.
    let scan = db
        .query_between(Timestamp::ZERO, Timestamp::OPEN)
        .unwrap();
    assert_eq!(scan.len(), 3);
}

#[test]
fn test_error_taxonomy() {
    let db = Chronica::memory().unwrap();
    db.insert("k", payload("k", 1)).unwrap();

    assert!(matches!(
        db.insert("k", payload("k", 2)),
        Err(ChronicaError::DuplicateKey(_))
    ));
    assert!(matches!(
        db.update("missing", payload("m", 1)),
        Err(ChronicaError::NotFound(_))
    ));
    assert!(matches!(
        db.delete("missing"),
        Err(ChronicaError::NotFound(_))
    ));

    // Failed operations leave no trace.
    assert_eq!(db.query_all().unwrap().len(), 1);
}

#[test]
fn test_atomic_batch() {
    let db = Chronica::memory().unwrap();

    db.atomic(|tx| {
        tx.insert("a", payload("a", 1))?;
        tx.insert("b", payload("b", 1))?;
        tx.insert("c", payload("c", 1))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.query_current().unwrap().len(), 3);

    // One bad op rejects the whole batch.
    let err = db
        .atomic(|tx| {
            tx.update("a", payload("a", 2))?;
            tx.insert("b", payload("b", 2))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, ChronicaError::DuplicateKey(_)));
    assert_eq!(
        db.get("a").unwrap().unwrap().payload.get("version"),
        Some(&Value::Int(1))
    );
    assert_eq!(db.versions("a").unwrap().len(), 1);
}

#[test]
fn test_reinsert_after_delete_leaves_gap() {
    let (db, clock) = fixture();

    db.insert("k", payload("k", 1)).unwrap();
    clock.set(Timestamp::from_secs(200));
    db.delete("k").unwrap();
    clock.set(Timestamp::from_secs(300));
    db.insert("k", payload("k", 2)).unwrap();

    let chain = db.versions("k").unwrap().into_vec();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].valid_to, Timestamp::from_secs(200));
    assert_eq!(chain[1].valid_from, Timestamp::from_secs(300));

    // Inside the gap the entity does not exist.
    assert!(db
        .version_as_of("k", Timestamp::from_secs(250))
        .unwrap()
        .is_none());
}

#[test]
fn test_stats_track_operations() {
    let (db, clock) = fixture();

    db.insert("a", payload("a", 1)).unwrap();
    clock.set(Timestamp::from_secs(200));
    db.update("a", payload("a", 2)).unwrap();
    db.insert("b", payload("b", 1)).unwrap();

    let stats = db.stats();
    assert_eq!(stats.key_count, 2);
    assert_eq!(stats.history_count, 1);
    assert_eq!(stats.operations_count, 3);
}

#[test]
fn test_concurrent_writers_interleave_cleanly() {
    let db = Chronica::memory().unwrap();
    let mut handles = Vec::new();

    for worker in 0..4 {
        let db = db.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                let key = format!("w{worker}:k{i}");
                db.insert(&key, payload(&key, 1)).unwrap();
                db.update(&key, payload(&key, 2)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.query_current().unwrap().len(), 200);
    let all = db.query_all().unwrap().into_vec();
    assert_eq!(all.len(), 400);
    // Every chain is contiguous and ends open.
    for pair in all.chunks(2) {
        assert_eq!(pair[0].valid_to, pair[1].valid_from);
        assert!(pair[1].is_open());
    }
}
