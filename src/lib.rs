//! # Chronica
//!
//! An embedded temporal versioning engine for Rust.
//!
//! Chronica keeps, for every entity key, the single live row version plus an
//! append-only archive of every version it ever had, each bounded by a
//! half-open validity interval `[valid_from, valid_to)`. On top of the two
//! stores it answers point-in-time (`AS OF`), range (`BETWEEN`) and full
//! audit-trail queries, with optional write-ahead-log persistence.
//!
//! ## Quick Start
//!
//! ```rust
//! use chronica::{Chronica, Payload, Timestamp, Value};
//!
//! let db = Chronica::memory()?;
//!
//! let born = db.insert("user:1", Payload::new().with("name", "ada"))?;
//! db.update("user:1", Payload::new().with("name", "ada lovelace"))?;
//!
//! // The live version reflects the update...
//! let live = db.get("user:1")?.unwrap();
//! assert_eq!(live.payload.get("name"), Some(&Value::Text("ada lovelace".into())));
//!
//! // ...while an as-of query at the insert instant still sees the original.
//! let old = db.version_as_of("user:1", born)?.unwrap();
//! assert_eq!(old.payload.get("name"), Some(&Value::Text("ada".into())));
//!
//! // The full chain: one closed version, one open.
//! assert_eq!(db.versions("user:1")?.len(), 2);
//! # Ok::<(), chronica::ChronicaError>(())
//! ```
//!
//! ## Features
//!
//! - `wal` (default): write-ahead-log persistence via `bincode`
//! - `toml`: TOML configuration loading

pub mod builder;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod types;
#[cfg(feature = "wal")]
pub mod wal;

pub use builder::DBBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SyncMode, SyncPolicy};
pub use db::{DB, Transaction, VersionScan};
pub use error::{ChronicaError, Result};
pub use store::{CurrentStore, HistoryStore};
pub use types::{DbStats, Payload, RowVersion, Timestamp, Value};
#[cfg(feature = "wal")]
pub use wal::{WalCommand, WalConfig, WalFile};

/// Convenience alias for the engine handle.
pub type Chronica = DB;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Chronica, ChronicaError, Clock, Config, DB, DBBuilder, ManualClock, Payload, Result,
        RowVersion, Timestamp, Transaction, Value, VersionScan,
    };
}
