//! Temporal query engine: point-in-time and range reads over both stores.
//!
//! Every query materializes its result under the shared read lock, so it
//! observes only committed state (never a half-closed version) and repeated
//! calls without intervening writes return identical results.

use super::DB;
use crate::error::Result;
use crate::types::{RowVersion, Timestamp};
use bytes::Bytes;
use std::collections::BTreeMap;

/// A restartable, finite sequence of row versions.
///
/// The scan owns a snapshot taken at query time; it can be iterated any
/// number of times.
#[derive(Debug, Clone, Default)]
pub struct VersionScan {
    versions: Vec<RowVersion>,
}

impl VersionScan {
    fn new(versions: Vec<RowVersion>) -> Self {
        Self { versions }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn into_vec(self) -> Vec<RowVersion> {
        self.versions
    }
}

impl IntoIterator for VersionScan {
    type Item = RowVersion;
    type IntoIter = std::vec::IntoIter<RowVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.into_iter()
    }
}

impl<'a> IntoIterator for &'a VersionScan {
    type Item = &'a RowVersion;
    type IntoIter = std::slice::Iter<'a, RowVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}

impl DB {
    /// All live versions, in entity-key order (a normal table scan).
    pub fn query_current(&self) -> Result<VersionScan> {
        let inner = self.read_checked()?;
        Ok(VersionScan::new(inner.current.iter().cloned().collect()))
    }

    /// For every entity that had a version valid at `at`, that one version.
    ///
    /// The current store answers for entities whose live version already
    /// existed at `at`; everything else falls back to the history store.
    /// Results are in entity-key order, at most one version per entity.
    pub fn query_as_of(&self, at: Timestamp) -> Result<VersionScan> {
        let inner = self.read_checked()?;

        let mut hits: BTreeMap<Bytes, RowVersion> = BTreeMap::new();
        for version in inner.current.iter() {
            if version.is_valid_at(at) {
                hits.insert(version.entity_key.clone(), version.clone());
            }
        }
        // Per-key intervals never overlap, so at most one archived version
        // can contain the instant.
        for version in inner.history.iter() {
            if version.is_valid_at(at) && !hits.contains_key(&version.entity_key) {
                hits.insert(version.entity_key.clone(), version.clone());
            }
        }

        Ok(VersionScan::new(hits.into_values().collect()))
    }

    /// Every version from either store whose validity interval intersects
    /// the inclusive range `[start, end]`. May return multiple versions per
    /// entity, ordered by `(entity_key, valid_from)`. Bounds given in either
    /// order are normalized.
    pub fn query_between(&self, start: Timestamp, end: Timestamp) -> Result<VersionScan> {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };

        let inner = self.read_checked()?;

        let mut versions: Vec<RowVersion> = inner
            .history
            .iter()
            .filter(|v| v.intersects(start, end))
            .cloned()
            .collect();
        versions.extend(
            inner
                .current
                .iter()
                .filter(|v| v.intersects(start, end))
                .cloned(),
        );
        versions.sort_by(|a, b| {
            (&a.entity_key, a.valid_from).cmp(&(&b.entity_key, b.valid_from))
        });

        Ok(VersionScan::new(versions))
    }

    /// The union of both stores, unfiltered by time — the full audit trail,
    /// ordered by `(entity_key, valid_from)`.
    pub fn query_all(&self) -> Result<VersionScan> {
        let inner = self.read_checked()?;

        let mut versions: Vec<RowVersion> = inner.history.iter().cloned().collect();
        versions.extend(inner.current.iter().cloned());
        versions.sort_by(|a, b| {
            (&a.entity_key, a.valid_from).cmp(&(&b.entity_key, b.valid_from))
        });

        Ok(VersionScan::new(versions))
    }

    /// The version of one entity valid at `at`, if any.
    pub fn version_as_of(
        &self,
        key: impl AsRef<[u8]>,
        at: Timestamp,
    ) -> Result<Option<RowVersion>> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let inner = self.read_checked()?;

        if let Some(live) = inner.current.get(&key)
            && live.is_valid_at(at)
        {
            return Ok(Some(live.clone()));
        }
        Ok(inner.history.version_at(&key, at).cloned())
    }

    /// Every version of one entity intersecting `[start, end]`, in
    /// `valid_from` order.
    pub fn versions_between(
        &self,
        key: impl AsRef<[u8]>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<VersionScan> {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };

        let key = Bytes::copy_from_slice(key.as_ref());
        let inner = self.read_checked()?;

        let mut versions: Vec<RowVersion> = inner
            .history
            .versions_for(&key)
            .filter(|v| v.intersects(start, end))
            .cloned()
            .collect();
        if let Some(live) = inner.current.get(&key)
            && live.intersects(start, end)
        {
            versions.push(live.clone());
        }

        Ok(VersionScan::new(versions))
    }

    /// The full version chain of one entity, oldest first.
    pub fn versions(&self, key: impl AsRef<[u8]>) -> Result<VersionScan> {
        let key = Bytes::copy_from_slice(key.as_ref());
        let inner = self.read_checked()?;

        let mut versions: Vec<RowVersion> =
            inner.history.versions_for(&key).cloned().collect();
        if let Some(live) = inner.current.get(&key) {
            versions.push(live.clone());
        }

        Ok(VersionScan::new(versions))
    }
}
