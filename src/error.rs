//! Error types for Chronica.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChronicaError>;

/// All errors surfaced by the temporal engine.
#[derive(Error, Debug)]
pub enum ChronicaError {
    /// Insert on an entity key that already has an open version.
    #[error("duplicate key '{0}': an open version already exists")]
    DuplicateKey(String),

    /// Update or delete on an entity key with no open version.
    #[error("key '{0}' not found: no open version exists")]
    NotFound(String),

    /// The interval invariants of the version chain were broken. This is a
    /// programming error, never silently corrected.
    #[error("version invariant violated: {0}")]
    InvariantViolation(String),

    /// The engine write lock could not be acquired within the configured
    /// timeout. Callers may retry under their own policy.
    #[error("concurrency conflict: engine lock not acquired within timeout")]
    ConcurrencyConflict,

    /// Operation attempted after `close()`.
    #[error("database is closed")]
    DatabaseClosed,

    /// A timestamp was outside the representable range.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The write-ahead log contained an unrecognized record.
    #[error("invalid log format")]
    InvalidFormat,

    /// The write-ahead log ended at a record boundary (normal end of replay).
    #[error("unexpected end of file")]
    UnexpectedEof,

    /// A log compaction is already running.
    #[error("log rewrite already in progress")]
    RewriteInProgress,

    #[error("{0}")]
    Other(String),
}

impl ChronicaError {
    pub(crate) fn duplicate_key(key: &[u8]) -> Self {
        Self::DuplicateKey(String::from_utf8_lossy(key).into_owned())
    }

    pub(crate) fn not_found(key: &[u8]) -> Self {
        Self::NotFound(String::from_utf8_lossy(key).into_owned())
    }
}
