//! Internal coordinator state and apply paths.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{ChronicaError, Result};
use crate::store::{CurrentStore, HistoryStore};
use crate::types::{DbStats, Payload, RowVersion, Timestamp};
#[cfg(feature = "wal")]
use crate::wal::{WalCommand, WalFile};
use bytes::Bytes;
use std::sync::Arc;

pub(crate) struct DBInner {
    /// Live row versions, exactly one open version per present entity.
    pub(crate) current: CurrentStore,
    /// Append-only archive of closed versions.
    pub(crate) history: HistoryStore,
    /// Injected timestamp source.
    pub(crate) clock: Arc<dyn Clock>,
    /// Write-ahead log for persistence.
    #[cfg(feature = "wal")]
    pub(crate) wal_file: Option<WalFile>,
    /// Whether the engine is closed.
    pub(crate) closed: bool,
    /// Engine statistics.
    pub(crate) stats: DbStats,
    /// Configuration.
    pub(crate) config: Config,
    /// Number of writes since last forced sync (SyncPolicy::Always only).
    #[cfg(feature = "wal")]
    sync_ops_since_flush: usize,
}

impl DBInner {
    pub(crate) fn new_with_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: CurrentStore::new(),
            history: HistoryStore::new(),
            clock,
            #[cfg(feature = "wal")]
            wal_file: None,
            closed: false,
            stats: DbStats::default(),
            config: config.clone(),
            #[cfg(feature = "wal")]
            sync_ops_since_flush: 0,
        }
    }

    /// Commit timestamp for opening a new version of `key`.
    ///
    /// Floored at the entity's last archived `valid_to` so a re-insert after
    /// delete can never overlap an archived interval, whatever the clock says.
    fn insert_timestamp(&self, key: &Bytes) -> Timestamp {
        let now = self.clock.now();
        match self.history.last_for(key) {
            Some(last) => now.max(last.valid_to),
            None => now,
        }
    }

    /// Commit timestamp for closing the open version of an entity.
    ///
    /// Floored one tick past the open version's `valid_from` so the closed
    /// interval is never empty; per-key ordering comes from this floor under
    /// the write lock, not from clock precision.
    fn close_timestamp(&self, open: &RowVersion) -> Timestamp {
        self.clock.now().max(open.valid_from.next())
    }

    pub(crate) fn apply_insert(&mut self, key: Bytes, payload: Payload) -> Result<Timestamp> {
        if self.current.contains(&key) {
            return Err(ChronicaError::duplicate_key(&key));
        }

        let at = self.insert_timestamp(&key);
        self.current.insert(RowVersion::open(key, payload, at))?;
        self.record_write();
        Ok(at)
    }

    pub(crate) fn apply_update(&mut self, key: &Bytes, payload: Payload) -> Result<Timestamp> {
        let Some(open) = self.current.get(key) else {
            return Err(ChronicaError::not_found(key));
        };

        let at = self.close_timestamp(open);
        let closed = open.closed_at(at);

        // Archive first: if the append trips an invariant the open version
        // is untouched and no partial state is visible.
        self.history.append(closed)?;
        self.current
            .replace(RowVersion::open(key.clone(), payload, at))?;
        self.record_write();
        Ok(at)
    }

    pub(crate) fn apply_delete(&mut self, key: &Bytes) -> Result<RowVersion> {
        let Some(open) = self.current.get(key) else {
            return Err(ChronicaError::not_found(key));
        };

        let at = self.close_timestamp(open);
        let closed = open.closed_at(at);

        self.history.append(closed.clone())?;
        self.current.remove(key);
        self.record_write();
        Ok(closed)
    }

    fn record_write(&mut self) {
        self.stats.record_operation();
        self.stats.set_key_count(self.current.len());
        self.stats.set_history_count(self.history.len());
    }

    pub(crate) fn refresh_counts(&mut self) {
        self.stats.set_key_count(self.current.len());
        self.stats.set_history_count(self.history.len());
    }
}

#[cfg(feature = "wal")]
impl DBInner {
    /// Append a command to the WAL, honoring the configured sync policy.
    pub(crate) fn log_command(&mut self, command: &WalCommand) -> Result<()> {
        let Some(wal_file) = self.wal_file.as_mut() else {
            return Ok(());
        };

        let sync_policy = self.config.sync_policy;
        let sync_mode = self.config.sync_mode;
        let batch_size = self.config.sync_batch_size;

        wal_file.write_command(command)?;

        use crate::config::SyncPolicy;
        match sync_policy {
            SyncPolicy::Always => {
                self.sync_ops_since_flush += 1;
                if self.sync_ops_since_flush >= batch_size {
                    wal_file.sync_with_mode(sync_mode)?;
                    self.sync_ops_since_flush = 0;
                } else {
                    wal_file.flush()?;
                }
            }
            SyncPolicy::EverySecond => {
                wal_file.flush()?;
            }
            SyncPolicy::Never => {}
        }

        if self
            .wal_file
            .as_ref()
            .is_some_and(WalFile::needs_compaction)
        {
            self.compact_wal()?;
        }

        Ok(())
    }

    pub(crate) fn sync_wal(&mut self) -> Result<()> {
        let sync_mode = self.config.sync_mode;
        if let Some(wal_file) = self.wal_file.as_mut() {
            wal_file.sync_with_mode(sync_mode)?;
            self.sync_ops_since_flush = 0;
        }
        Ok(())
    }

    /// Rebuild both stores from the WAL (startup replay).
    ///
    /// Replay re-applies each command with its recorded commit timestamp, so
    /// the reconstructed chains are identical to the ones that produced the
    /// log. A log whose commands cannot be applied in order is corrupt and
    /// refuses to open.
    pub(crate) fn load_from_wal(&mut self, wal_file: &mut WalFile) -> Result<()> {
        let commands = wal_file.replay()?;
        log::debug!(
            "replaying {} WAL commands from {:?}",
            commands.len(),
            wal_file.path()
        );
        for command in commands {
            match command {
                WalCommand::Insert { key, payload, at } => {
                    self.replay_insert(key, payload, at)?;
                }
                WalCommand::Update { key, payload, at } => {
                    self.replay_update(&key, payload, at)?;
                }
                WalCommand::Delete { key, at } => {
                    self.replay_delete(&key, at)?;
                }
            }
        }

        self.refresh_counts();
        Ok(())
    }

    fn replay_insert(&mut self, key: Bytes, payload: Payload, at: Timestamp) -> Result<()> {
        if self.current.contains(&key) {
            return Err(ChronicaError::InvariantViolation(
                "replayed insert over an open version".to_string(),
            ));
        }
        if let Some(last) = self.history.last_for(&key)
            && last.valid_to > at
        {
            return Err(ChronicaError::InvariantViolation(format!(
                "replayed insert at {} inside archived interval ending {}",
                at, last.valid_to
            )));
        }
        self.current.insert(RowVersion::open(key, payload, at))
    }

    fn replay_update(&mut self, key: &Bytes, payload: Payload, at: Timestamp) -> Result<()> {
        let Some(open) = self.current.get(key) else {
            return Err(ChronicaError::InvariantViolation(
                "replayed update with no open version".to_string(),
            ));
        };
        self.history.append(open.closed_at(at))?;
        self.current
            .replace(RowVersion::open(key.clone(), payload, at))?;
        Ok(())
    }

    fn replay_delete(&mut self, key: &Bytes, at: Timestamp) -> Result<()> {
        let Some(open) = self.current.get(key) else {
            return Err(ChronicaError::InvariantViolation(
                "replayed delete with no open version".to_string(),
            ));
        };
        self.history.append(open.closed_at(at))?;
        self.current.remove(key);
        Ok(())
    }

    /// Minimal command stream that reconstructs the live stores.
    ///
    /// Adjacent versions replay as updates; a gap between versions replays
    /// as a delete followed by a re-insert at the recorded instants.
    pub(crate) fn compaction_commands(&self) -> Vec<WalCommand> {
        use std::collections::BTreeSet;

        let mut keys: BTreeSet<Bytes> = BTreeSet::new();
        for v in self.history.iter() {
            keys.insert(v.entity_key.clone());
        }
        for v in self.current.iter() {
            keys.insert(v.entity_key.clone());
        }

        let mut commands = Vec::new();
        for key in keys {
            let mut chain: Vec<&RowVersion> = self.history.versions_for(&key).collect();
            if let Some(open) = self.current.get(&key) {
                chain.push(open);
            }

            let mut prev_valid_to: Option<Timestamp> = None;
            for version in &chain {
                match prev_valid_to {
                    None => commands.push(WalCommand::Insert {
                        key: key.clone(),
                        payload: version.payload.clone(),
                        at: version.valid_from,
                    }),
                    Some(end) if end == version.valid_from => {
                        commands.push(WalCommand::Update {
                            key: key.clone(),
                            payload: version.payload.clone(),
                            at: version.valid_from,
                        });
                    }
                    Some(end) => {
                        commands.push(WalCommand::Delete {
                            key: key.clone(),
                            at: end,
                        });
                        commands.push(WalCommand::Insert {
                            key: key.clone(),
                            payload: version.payload.clone(),
                            at: version.valid_from,
                        });
                    }
                }
                prev_valid_to = Some(version.valid_to);
            }

            // A chain ending in a closed version means the entity was deleted.
            if let Some(end) = prev_valid_to
                && !end.is_open()
            {
                commands.push(WalCommand::Delete {
                    key: key.clone(),
                    at: end,
                });
            }
        }

        commands
    }

    /// Compact the WAL from live state. Returns false when no WAL is open.
    pub(crate) fn compact_wal(&mut self) -> Result<bool> {
        if self.wal_file.is_none() {
            return Ok(false);
        }
        let commands = self.compaction_commands();
        if let Some(wal_file) = self.wal_file.as_mut() {
            wal_file.rewrite(&commands)?;
            self.sync_ops_since_flush = 0;
        }
        Ok(true)
    }
}
