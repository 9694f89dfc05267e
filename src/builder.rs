//! Builder for configuring and opening an engine.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{DB, DBInner};
use crate::error::{ChronicaError, Result};
#[cfg(feature = "wal")]
use crate::wal::WalFile;
#[cfg(feature = "wal")]
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for [`DB`] instances.
///
/// Covers the cases the shorthand constructors do not: a custom
/// configuration together with a WAL path, or an injected clock for
/// deterministic timestamps in tests.
///
/// # Examples
///
/// ```rust
/// use chronica::{Chronica, Config, SyncPolicy};
///
/// let db = Chronica::builder()
///     .config(Config::default().with_sync_policy(SyncPolicy::Never))
///     .build()?;
/// # Ok::<(), chronica::ChronicaError>(())
/// ```
#[derive(Debug, Default)]
pub struct DBBuilder {
    #[cfg(feature = "wal")]
    wal_path: Option<PathBuf>,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
}

impl DBBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist writes to a WAL at `path`, replaying it first if it exists.
    /// Without this the engine is in-memory only.
    #[cfg(feature = "wal")]
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Inject a timestamp source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<DB> {
        self.config.validate().map_err(ChronicaError::Other)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        #[allow(unused_mut)]
        let mut inner = DBInner::new_with_config(&self.config, clock);

        #[cfg(feature = "wal")]
        if let Some(path) = self.wal_path {
            let mut wal_file = WalFile::open(&path)?;
            inner.load_from_wal(&mut wal_file)?;
            inner.wal_file = Some(wal_file);
        }

        Ok(DB::from_inner(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{Payload, Timestamp, Value};

    #[test]
    fn test_builder_defaults_to_memory() {
        let db = DBBuilder::new().build().unwrap();
        db.insert("k", Payload::new().with("x", Value::Int(1)))
            .unwrap();
        #[cfg(feature = "wal")]
        assert!(db.wal_size().unwrap().is_none());
    }

    #[test]
    fn test_builder_injected_clock_drives_timestamps() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(42)));
        let db = DBBuilder::new().clock(clock).build().unwrap();

        let at = db
            .insert("k", Payload::new().with("x", Value::Int(1)))
            .unwrap();
        assert_eq!(at, Timestamp::from_secs(42));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = Config::default();
        config.sync_batch_size = 0;
        assert!(DBBuilder::new().config(config).build().is_err());
    }

    #[cfg(feature = "wal")]
    #[test]
    fn test_builder_wal_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.wal");

        {
            let db = DBBuilder::new().wal_path(&path).build().unwrap();
            db.insert("k", Payload::new().with("x", Value::Int(7)))
                .unwrap();
            db.sync().unwrap();
        }

        let db = DBBuilder::new().wal_path(&path).build().unwrap();
        assert!(db.contains("k").unwrap());
    }
}
