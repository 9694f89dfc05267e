//! The history store: append-only archive of closed row versions.

use crate::error::{ChronicaError, Result};
use crate::types::{RowVersion, Timestamp};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Closed versions indexed by `(entity_key, valid_from)`. Entries are never
/// mutated after append; they disappear only through retention pruning.
#[derive(Debug, Default)]
pub struct HistoryStore {
    versions: BTreeMap<(Bytes, Timestamp), RowVersion>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a closed version.
    ///
    /// Rejects open or empty intervals and any overlap with the entity's
    /// last archived version. These are coordinator bugs, not runtime
    /// conditions, so they surface as `InvariantViolation`.
    pub(crate) fn append(&mut self, version: RowVersion) -> Result<()> {
        if version.is_open() {
            return Err(ChronicaError::InvariantViolation(
                "open version offered to history store".to_string(),
            ));
        }
        if version.valid_from >= version.valid_to {
            return Err(ChronicaError::InvariantViolation(format!(
                "empty or inverted interval [{}, {})",
                version.valid_from, version.valid_to
            )));
        }
        if let Some(prev) = self.last_for(&version.entity_key)
            && prev.valid_to > version.valid_from
        {
            return Err(ChronicaError::InvariantViolation(format!(
                "interval [{}, {}) overlaps archived interval [{}, {})",
                version.valid_from, version.valid_to, prev.valid_from, prev.valid_to
            )));
        }

        let index = (version.entity_key.clone(), version.valid_from);
        self.versions.insert(index, version);
        Ok(())
    }

    /// The most recently archived version of an entity, if any.
    pub fn last_for(&self, key: &Bytes) -> Option<&RowVersion> {
        self.range_for(key).next_back()
    }

    /// The archived version of an entity valid at `at`, if any.
    pub fn version_at(&self, key: &Bytes, at: Timestamp) -> Option<&RowVersion> {
        self.versions
            .range(..=(key.clone(), at))
            .next_back()
            .map(|(_, v)| v)
            .filter(|v| v.entity_key == *key && v.is_valid_at(at))
    }

    /// All archived versions of an entity in `valid_from` order.
    pub fn versions_for<'a>(&'a self, key: &Bytes) -> impl Iterator<Item = &'a RowVersion> {
        self.range_for(key)
    }

    /// All archived versions in `(entity_key, valid_from)` order.
    pub fn iter(&self) -> impl Iterator<Item = &RowVersion> {
        self.versions.values()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Remove versions that fell out of the retention horizon, i.e. those
    /// with `valid_to <= horizon`. Entries inside the horizon are never
    /// touched. `max_items` bounds the work done in one call.
    pub(crate) fn prune(&mut self, horizon: Timestamp, max_items: Option<usize>) -> usize {
        let limit = max_items.unwrap_or(usize::MAX);
        let doomed: Vec<(Bytes, Timestamp)> = self
            .versions
            .values()
            .filter(|v| v.valid_to <= horizon)
            .take(limit)
            .map(|v| (v.entity_key.clone(), v.valid_from))
            .collect();

        for index in &doomed {
            self.versions.remove(index);
        }
        doomed.len()
    }

    /// Withdraw the most recent archived version of an entity (transaction
    /// rollback path; never part of the public append-only contract).
    pub(crate) fn remove_last(&mut self, key: &Bytes) -> Option<RowVersion> {
        let index = self
            .last_for(key)
            .map(|v| (v.entity_key.clone(), v.valid_from))?;
        self.versions.remove(&index)
    }

    fn range_for<'a>(&'a self, key: &Bytes) -> impl DoubleEndedIterator<Item = &'a RowVersion> {
        self.versions
            .range((key.clone(), Timestamp::ZERO)..=(key.clone(), Timestamp::OPEN))
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;

    fn closed(key: &'static [u8], from: u64, to: u64) -> RowVersion {
        RowVersion {
            entity_key: Bytes::from_static(key),
            payload: Payload::new(),
            valid_from: Timestamp::from_secs(from),
            valid_to: Timestamp::from_secs(to),
        }
    }

    #[test]
    fn test_append_and_lookup() {
        let mut store = HistoryStore::new();
        store.append(closed(b"e1", 100, 200)).unwrap();
        store.append(closed(b"e1", 200, 300)).unwrap();
        store.append(closed(b"e2", 150, 250)).unwrap();

        let key = Bytes::from_static(b"e1");
        assert_eq!(store.len(), 3);
        assert_eq!(store.versions_for(&key).count(), 2);
        assert_eq!(
            store.last_for(&key).unwrap().valid_to,
            Timestamp::from_secs(300)
        );

        let at_150 = store.version_at(&key, Timestamp::from_secs(150)).unwrap();
        assert_eq!(at_150.valid_from, Timestamp::from_secs(100));

        // Boundary instant belongs to the successor.
        let at_200 = store.version_at(&key, Timestamp::from_secs(200)).unwrap();
        assert_eq!(at_200.valid_from, Timestamp::from_secs(200));

        assert!(store.version_at(&key, Timestamp::from_secs(99)).is_none());
        assert!(store.version_at(&key, Timestamp::from_secs(300)).is_none());
    }

    #[test]
    fn test_version_at_does_not_bleed_across_keys() {
        let mut store = HistoryStore::new();
        store.append(closed(b"a", 100, 200)).unwrap();

        let other = Bytes::from_static(b"b");
        assert!(store.version_at(&other, Timestamp::from_secs(150)).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let mut store = HistoryStore::new();
        store.append(closed(b"e1", 100, 200)).unwrap();

        let err = store.append(closed(b"e1", 150, 250)).unwrap_err();
        assert!(matches!(err, ChronicaError::InvariantViolation(_)));

        // Contiguous append is fine.
        store.append(closed(b"e1", 200, 300)).unwrap();
    }

    #[test]
    fn test_open_and_empty_intervals_rejected() {
        let mut store = HistoryStore::new();

        let open = RowVersion::open(
            Bytes::from_static(b"e1"),
            Payload::new(),
            Timestamp::from_secs(100),
        );
        assert!(store.append(open).is_err());

        assert!(store.append(closed(b"e1", 100, 100)).is_err());
    }

    #[test]
    fn test_prune_respects_horizon_and_batch() {
        let mut store = HistoryStore::new();
        store.append(closed(b"e1", 100, 200)).unwrap();
        store.append(closed(b"e1", 200, 300)).unwrap();
        store.append(closed(b"e1", 300, 400)).unwrap();

        // Version closed exactly at the horizon is prunable; later ones stay.
        let removed = store.prune(Timestamp::from_secs(300), Some(1));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);

        let removed = store.prune(Timestamp::from_secs(300), None);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.iter().next().unwrap().valid_from,
            Timestamp::from_secs(300)
        );
    }

    #[test]
    fn test_remove_last_withdraws_newest() {
        let mut store = HistoryStore::new();
        store.append(closed(b"e1", 100, 200)).unwrap();
        store.append(closed(b"e1", 200, 300)).unwrap();

        let key = Bytes::from_static(b"e1");
        let withdrawn = store.remove_last(&key).unwrap();
        assert_eq!(withdrawn.valid_from, Timestamp::from_secs(200));
        assert_eq!(store.len(), 1);
    }
}
