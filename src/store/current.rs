//! The current store: one open version per live entity.

use crate::error::{ChronicaError, Result};
use crate::types::RowVersion;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Mapping from entity key to its single live row version (B-tree for
/// ordered scans). At most one version per key, always open.
#[derive(Debug, Default)]
pub struct CurrentStore {
    rows: BTreeMap<Bytes, RowVersion>,
}

impl CurrentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Bytes) -> Option<&RowVersion> {
        self.rows.get(key)
    }

    pub fn contains(&self, key: &Bytes) -> bool {
        self.rows.contains_key(key)
    }

    /// Admit a new open version for an entity that has none.
    pub(crate) fn insert(&mut self, version: RowVersion) -> Result<()> {
        if !version.is_open() {
            return Err(ChronicaError::InvariantViolation(format!(
                "closed version [{}, {}) offered to current store",
                version.valid_from, version.valid_to
            )));
        }
        if self.rows.contains_key(&version.entity_key) {
            return Err(ChronicaError::InvariantViolation(
                "two open versions for one entity key".to_string(),
            ));
        }
        self.rows.insert(version.entity_key.clone(), version);
        Ok(())
    }

    /// Swap the open version of an entity that already has one.
    pub(crate) fn replace(&mut self, version: RowVersion) -> Result<RowVersion> {
        if !version.is_open() {
            return Err(ChronicaError::InvariantViolation(format!(
                "closed version [{}, {}) offered to current store",
                version.valid_from, version.valid_to
            )));
        }
        let Some(slot) = self.rows.get_mut(&version.entity_key) else {
            return Err(ChronicaError::InvariantViolation(
                "replace of a missing open version".to_string(),
            ));
        };
        Ok(std::mem::replace(slot, version))
    }

    pub(crate) fn remove(&mut self, key: &Bytes) -> Option<RowVersion> {
        self.rows.remove(key)
    }

    /// Re-admit a previously removed open version (transaction rollback path).
    pub(crate) fn restore(&mut self, version: RowVersion) {
        self.rows.insert(version.entity_key.clone(), version);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowVersion> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
