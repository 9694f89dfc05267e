//! History retention: pruning archived versions past a configured horizon.
//!
//! Pruning only ever touches closed versions whose `valid_to` is at or
//! before the horizon. Open versions and the current store are never
//! candidates, so live reads and as-of queries newer than the horizon are
//! unaffected.

use super::DB;
use crate::error::Result;
use crate::types::Timestamp;

impl DB {
    /// Remove every archived version that expired at or before `horizon`.
    /// Returns the number of versions removed.
    pub fn prune_history(&self, horizon: Timestamp) -> Result<usize> {
        self.prune_batch(horizon, None)
    }

    /// Like [`prune_history`](DB::prune_history), but removes at most
    /// `max_items` versions per call so large backlogs can be drained
    /// without holding the write lock for the whole sweep.
    pub fn prune_history_batch(&self, horizon: Timestamp, max_items: usize) -> Result<usize> {
        self.prune_batch(horizon, Some(max_items))
    }

    /// Prune according to the configured retention window, measured back
    /// from the clock's current time. A no-op when no retention is set.
    pub fn apply_retention(&self) -> Result<usize> {
        let horizon = {
            let inner = self.read_checked()?;
            match inner.config.retention() {
                Some(retention) => inner.clock.now().saturating_sub(retention),
                None => return Ok(0),
            }
        };
        self.prune_batch(horizon, None)
    }

    fn prune_batch(&self, horizon: Timestamp, max_items: Option<usize>) -> Result<usize> {
        let mut inner = self.write_checked()?;
        let pruned = inner.history.prune(horizon, max_items);
        if pruned > 0 {
            inner.stats.record_pruned(pruned as u64);
            inner.refresh_counts();
            log::debug!("pruned {pruned} archived versions up to {horizon}");
        }
        Ok(pruned)
    }
}
