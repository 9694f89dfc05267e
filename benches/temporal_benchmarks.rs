use chronica::{Chronica, ManualClock, Payload, Timestamp};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

fn payload(i: u64) -> Payload {
    Payload::new()
        .with("id", i as i64)
        .with("name", format!("entity-{i}"))
        .with("active", true)
}

fn bench_inserts(c: &mut Criterion) {
    c.bench_function("insert_1000", |b| {
        b.iter(|| {
            let db = Chronica::memory().unwrap();
            for i in 0..1000u64 {
                db.insert(format!("key:{i}"), payload(i)).unwrap();
            }
            black_box(db.stats().key_count)
        })
    });
}

fn bench_updates(c: &mut Criterion) {
    c.bench_function("update_1000_same_key", |b| {
        b.iter(|| {
            let db = Chronica::memory().unwrap();
            db.insert("key", payload(0)).unwrap();
            for i in 1..=1000u64 {
                db.update("key", payload(i)).unwrap();
            }
            black_box(db.stats().history_count)
        })
    });
}

fn bench_transactions(c: &mut Criterion) {
    c.bench_function("atomic_batch_100", |b| {
        b.iter(|| {
            let db = Chronica::memory().unwrap();
            db.atomic(|tx| {
                for i in 0..100u64 {
                    tx.insert(format!("key:{i}"), payload(i))?;
                }
                Ok(())
            })
            .unwrap();
            black_box(db.stats().key_count)
        })
    });
}

fn bench_temporal_queries(c: &mut Criterion) {
    // 100 entities, 10 versions each, at deterministic instants.
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(0)));
    let db = Chronica::builder().clock(clock.clone()).build().unwrap();
    for i in 0..100u64 {
        clock.set(Timestamp::from_secs(i));
        db.insert(format!("key:{i}"), payload(i)).unwrap();
    }
    for round in 1..10u64 {
        for i in 0..100u64 {
            clock.set(Timestamp::from_secs(round * 1000 + i));
            db.update(format!("key:{i}"), payload(round * 100 + i)).unwrap();
        }
    }

    c.bench_function("query_as_of_1000_versions", |b| {
        b.iter(|| black_box(db.query_as_of(Timestamp::from_secs(5_050)).unwrap().len()))
    });

    c.bench_function("query_between_1000_versions", |b| {
        b.iter(|| {
            black_box(
                db.query_between(Timestamp::from_secs(2_000), Timestamp::from_secs(5_000))
                    .unwrap()
                    .len(),
            )
        })
    });

    c.bench_function("version_as_of_single_key", |b| {
        b.iter(|| {
            black_box(
                db.version_as_of("key:50", Timestamp::from_secs(5_050))
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_inserts,
    bench_updates,
    bench_transactions,
    bench_temporal_queries
);
criterion_main!(benches);
