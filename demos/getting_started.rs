//! A tour of the engine: versioned writes, time travel, and the audit trail.
//!
//! Run with: `cargo run --example getting_started`

use chronica::{Chronica, Payload, Result, Value};

fn main() -> Result<()> {
    env_logger::init();

    let db = Chronica::memory()?;

    // Every write opens a new version; updates close the old one first.
    let hired = db.insert(
        "emp:1",
        Payload::new().with("name", "ada").with("title", "engineer"),
    )?;
    println!("hired at {hired}");

    let promoted = db.update(
        "emp:1",
        Payload::new()
            .with("name", "ada")
            .with("title", "staff engineer"),
    )?;
    println!("promoted at {promoted}");

    // The live version reflects the latest write.
    let live = db.get("emp:1")?.ok_or_else(|| {
        chronica::ChronicaError::Other("employee vanished".to_string())
    })?;
    println!("current title: {:?}", live.payload.get("title"));

    // Time travel: what did the row look like at the hire instant?
    if let Some(original) = db.version_as_of("emp:1", hired)? {
        println!("title as of hire: {:?}", original.payload.get("title"));
    }

    // Several writes, atomically.
    db.atomic(|tx| {
        tx.insert("emp:2", Payload::new().with("name", "grace"))?;
        tx.insert("emp:3", Payload::new().with("name", "edsger"))?;
        Ok(())
    })?;

    // The full audit trail across all entities.
    println!("\naudit trail:");
    for version in db.query_all()?.iter() {
        println!(
            "  {:?} [{} .. {}] {:?}",
            String::from_utf8_lossy(&version.entity_key),
            version.valid_from,
            version.valid_to,
            version.payload.get("name").unwrap_or(&Value::Null),
        );
    }

    let stats = db.stats();
    println!(
        "\n{} live entities, {} archived versions, {} writes",
        stats.key_count, stats.history_count, stats.operations_count
    );

    Ok(())
}
