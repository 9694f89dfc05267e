//! Core data model: timestamps, payloads, and row versions.

use crate::error::{ChronicaError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Transaction timestamp in microseconds since the Unix epoch.
///
/// `Timestamp::OPEN` is the +infinity sentinel carried by the open version of
/// an entity; it compares greater than every real instant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    /// Sentinel for "still valid": the `valid_to` of an open version.
    pub const OPEN: Timestamp = Timestamp(u64::MAX);

    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Convenience constructor for whole-second instants, useful in tests and
    /// demos.
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1_000_000)
    }

    pub fn from_system_time(t: SystemTime) -> Result<Self> {
        let micros = t
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ChronicaError::InvalidTimestamp)?
            .as_micros();
        u64::try_from(micros)
            .map(Timestamp)
            .map_err(|_| ChronicaError::InvalidTimestamp)
    }

    pub const fn is_open(self) -> bool {
        self.0 == u64::MAX
    }

    /// The next representable instant. Saturates at the sentinel.
    pub const fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }

    pub fn saturating_sub(self, d: Duration) -> Self {
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_sub(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "+inf")
        } else {
            write!(f, "{}us", self.0)
        }
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// The versioned column values of one row state.
///
/// Columns keep their insertion order; setting an existing column replaces its
/// value in place. The engine treats the mapping as opaque — the column schema
/// is the caller's concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    columns: SmallVec<[(String, Value); 8]>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.columns.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.columns.push((column, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (column, value) in iter {
            payload.set(column, value);
        }
        payload
    }
}

/// One state of one logical entity during one half-open interval of time.
///
/// A version is visible at exactly its `valid_from` instant and invisible at
/// exactly its `valid_to` instant; the successor version (if any) becomes
/// visible there instead.
#[derive(Debug, Clone, PartialEq)]
pub struct RowVersion {
    /// Stable identifier of the logical row across all its versions.
    pub entity_key: Bytes,
    /// Column values during this interval.
    pub payload: Payload,
    /// Inclusive start of validity.
    pub valid_from: Timestamp,
    /// Exclusive end of validity; `Timestamp::OPEN` while current.
    pub valid_to: Timestamp,
}

impl RowVersion {
    pub(crate) fn open(entity_key: Bytes, payload: Payload, valid_from: Timestamp) -> Self {
        Self {
            entity_key,
            payload,
            valid_from,
            valid_to: Timestamp::OPEN,
        }
    }

    /// Whether this is the live version of its entity.
    pub fn is_open(&self) -> bool {
        self.valid_to.is_open()
    }

    /// Whether the version was the answer for its entity at instant `at`.
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        self.valid_from <= at && at < self.valid_to
    }

    /// Whether the validity interval intersects the inclusive range
    /// `[start, end]`.
    pub fn intersects(&self, start: Timestamp, end: Timestamp) -> bool {
        self.valid_from <= end && self.valid_to > start
    }

    /// A closed copy of this version, archived as of `at`.
    pub(crate) fn closed_at(&self, at: Timestamp) -> Self {
        Self {
            entity_key: self.entity_key.clone(),
            payload: self.payload.clone(),
            valid_from: self.valid_from,
            valid_to: at,
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbStats {
    /// Number of entities with an open version.
    pub key_count: usize,
    /// Number of closed versions in the history store.
    pub history_count: usize,
    /// Total number of write operations performed.
    pub operations_count: u64,
    /// Number of history versions destroyed by retention pruning.
    pub pruned_count: u64,
}

impl DbStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&mut self) {
        self.operations_count += 1;
    }

    pub fn record_pruned(&mut self, count: u64) {
        self.pruned_count += count;
    }

    pub fn set_key_count(&mut self, count: usize) {
        self.key_count = count;
    }

    pub fn set_history_count(&mut self, count: usize) {
        self.history_count = count;
    }
}
