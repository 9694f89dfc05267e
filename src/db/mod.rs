//! Core engine implementation.
//!
//! This module defines the main `DB` type: the versioning coordinator that
//! owns the current and history stores, plus the temporal query surface
//! layered on top of them.

use crate::builder::DBBuilder;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::{ChronicaError, Result};
use crate::types::{DbStats, Payload, RowVersion, Timestamp};
#[cfg(feature = "wal")]
use crate::wal::WalFile;
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
#[cfg(feature = "wal")]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod internal;
mod query;
mod retention;
mod transaction;

pub(crate) use internal::DBInner;
pub use query::VersionScan;
pub use transaction::Transaction;

/// Embedded temporal versioning engine.
///
/// `DB` maintains, for every entity key, the single live row version plus an
/// append-only archive of every prior version, and answers point-in-time and
/// range queries over both. Handles are cheap clones sharing one engine; all
/// writes serialize through an internal lock, and readers observe only
/// committed state.
///
/// # Examples
///
/// ```rust
/// use chronica::{Chronica, Payload, Value};
///
/// let db = Chronica::memory()?;
///
/// db.insert("user:1", Payload::new().with("name", "ada"))?;
/// db.update("user:1", Payload::new().with("name", "ada lovelace"))?;
///
/// // Full audit trail: the closed version and the live one.
/// assert_eq!(db.versions("user:1")?.len(), 2);
/// # Ok::<(), chronica::ChronicaError>(())
/// ```
#[derive(Clone)]
pub struct DB {
    pub(crate) inner: Arc<RwLock<DBInner>>,
    lock_timeout: Duration,
}

impl DB {
    /// Opens an engine from a file path or creates a new one.
    ///
    /// Opening an existing path replays the write-ahead log to restore both
    /// stores to their previous state. Use `":memory:"` for a purely
    /// in-memory engine.
    #[cfg(feature = "wal")]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens an engine with custom configuration, replaying the WAL at
    /// `path` unless it is `":memory:"`.
    #[cfg(feature = "wal")]
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let is_memory = path.to_str() == Some(":memory:");

        config
            .validate()
            .map_err(ChronicaError::Other)?;

        let mut inner = DBInner::new_with_config(&config, Arc::new(SystemClock::new()));

        if !is_memory {
            let mut wal_file = WalFile::open(path)?;
            inner.load_from_wal(&mut wal_file)?;
            inner.wal_file = Some(wal_file);
        }

        Ok(Self::from_inner(inner))
    }

    /// Creates a new in-memory engine.
    pub fn memory() -> Result<Self> {
        Self::memory_with_config(Config::default())
    }

    /// Creates an in-memory engine with custom configuration.
    pub fn memory_with_config(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(ChronicaError::Other)?;
        let inner = DBInner::new_with_config(&config, Arc::new(SystemClock::new()));
        Ok(Self::from_inner(inner))
    }

    /// Create an engine builder for advanced configuration (custom WAL path,
    /// injected clock).
    pub fn builder() -> DBBuilder {
        DBBuilder::new()
    }

    pub(crate) fn from_inner(inner: DBInner) -> Self {
        let lock_timeout = inner.config.lock_timeout();
        Self {
            inner: Arc::new(RwLock::new(inner)),
            lock_timeout,
        }
    }

    pub(crate) fn read_checked(&self) -> Result<RwLockReadGuard<'_, DBInner>> {
        let guard = self.inner.read();
        if guard.closed {
            return Err(ChronicaError::DatabaseClosed);
        }
        Ok(guard)
    }

    pub(crate) fn write_checked(&self) -> Result<RwLockWriteGuard<'_, DBInner>> {
        let guard = self
            .inner
            .try_write_for(self.lock_timeout)
            .ok_or(ChronicaError::ConcurrencyConflict)?;
        if guard.closed {
            return Err(ChronicaError::DatabaseClosed);
        }
        Ok(guard)
    }

    /// Get engine statistics.
    pub fn stats(&self) -> DbStats {
        self.inner.read().stats.clone()
    }

    /// Create the first version of an entity.
    ///
    /// Fails with `DuplicateKey` if the entity already has an open version.
    /// Returns the `valid_from` of the new open version.
    pub fn insert(&self, key: impl AsRef<[u8]>, payload: Payload) -> Result<Timestamp> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let mut inner = self.write_checked()?;

        #[cfg(feature = "wal")]
        let logged = payload.clone();

        let at = inner.apply_insert(key.clone(), payload)?;

        #[cfg(feature = "wal")]
        inner.log_command(&crate::wal::WalCommand::Insert {
            key,
            payload: logged,
            at,
        })?;

        Ok(at)
    }

    /// Replace the open version of an entity.
    ///
    /// Atomically closes the old version into the history store and opens a
    /// new one at the same instant, so no gap or overlap is ever visible.
    /// Fails with `NotFound` if the entity has no open version. Returns the
    /// boundary timestamp.
    pub fn update(&self, key: impl AsRef<[u8]>, payload: Payload) -> Result<Timestamp> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let mut inner = self.write_checked()?;

        #[cfg(feature = "wal")]
        let logged = payload.clone();

        let at = inner.apply_update(&key, payload)?;

        #[cfg(feature = "wal")]
        inner.log_command(&crate::wal::WalCommand::Update {
            key,
            payload: logged,
            at,
        })?;

        Ok(at)
    }

    /// Close the open version of an entity without opening a successor.
    ///
    /// Fails with `NotFound` if the entity has no open version. Returns the
    /// archived version, closed as of the commit instant.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<RowVersion> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let mut inner = self.write_checked()?;

        let closed = inner.apply_delete(&key)?;

        #[cfg(feature = "wal")]
        inner.log_command(&crate::wal::WalCommand::Delete {
            key,
            at: closed.valid_to,
        })?;

        Ok(closed)
    }

    /// The live version of an entity, if present.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<RowVersion>> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let inner = self.read_checked()?;
        Ok(inner.current.get(&key).cloned())
    }

    /// Whether the entity currently has an open version.
    pub fn contains(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let inner = self.read_checked()?;
        Ok(inner.current.contains(&key))
    }

    /// Start a buffered transaction. Nothing is applied until `commit`.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Execute multiple operations atomically. All succeed or none apply.
    ///
    /// ```rust
    /// use chronica::{Chronica, Payload};
    ///
    /// let db = Chronica::memory()?;
    /// db.atomic(|tx| {
    ///     tx.insert("a", Payload::new().with("x", 1i64))?;
    ///     tx.insert("b", Payload::new().with("x", 2i64))?;
    ///     Ok(())
    /// })?;
    /// # Ok::<(), chronica::ChronicaError>(())
    /// ```
    pub fn atomic<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction) -> Result<R>,
    {
        let mut tx = self.transaction();
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Force sync all pending WAL writes to disk.
    #[cfg(feature = "wal")]
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.write_checked()?;
        inner.sync_wal()
    }

    /// Current WAL size in bytes, or None for an in-memory engine.
    #[cfg(feature = "wal")]
    pub fn wal_size(&self) -> Result<Option<u64>> {
        let inner = self.read_checked()?;
        Ok(inner.wal_file.as_ref().map(|w| w.size()))
    }

    /// Rewrite the WAL as the minimal command stream reconstructing the live
    /// stores. Returns false for an in-memory engine.
    #[cfg(feature = "wal")]
    pub fn compact_wal(&self) -> Result<bool> {
        let mut inner = self.write_checked()?;
        inner.compact_wal()
    }

    /// Gracefully close the engine.
    ///
    /// Further operations on any handle return `DatabaseClosed`.
    pub fn close(&self) -> Result<()> {
        let mut inner = self
            .inner
            .try_write_for(self.lock_timeout)
            .ok_or(ChronicaError::ConcurrencyConflict)?;
        if inner.closed {
            return Err(ChronicaError::DatabaseClosed);
        }

        inner.closed = true;
        #[cfg(feature = "wal")]
        inner.sync_wal()?;
        Ok(())
    }
}

/// Best-effort sync when the last handle is dropped.
impl Drop for DB {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) != 1 {
            return;
        }
        #[cfg(feature = "wal")]
        if let Some(mut inner) = self.inner.try_write() {
            if !inner.closed {
                let _ = inner.sync_wal();
            }
        }
    }
}
