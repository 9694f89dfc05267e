//! Atomic multi-operation transactions.
//!
//! Operations are buffered and nothing touches the stores until `commit`.
//! The commit validates the whole batch against the current store first, so
//! the common failures (`DuplicateKey`, `NotFound`) reject the transaction
//! before any mutation. Should an apply step still fail, the already-applied
//! steps are undone before the error surfaces; other handles never observe a
//! half-committed transaction.

use super::DB;
use super::internal::DBInner;
use crate::error::{ChronicaError, Result};
use crate::types::{Payload, RowVersion};
use bytes::Bytes;
use rustc_hash::FxHashMap;

/// Buffered transaction. All operations succeed or none apply.
///
/// Dropping an uncommitted transaction discards it.
pub struct Transaction {
    db: DB,
    ops: Vec<TxOp>,
}

#[derive(Debug, Clone)]
enum TxOp {
    Insert { key: Bytes, payload: Payload },
    Update { key: Bytes, payload: Payload },
    Delete { key: Bytes },
}

impl TxOp {
    fn key(&self) -> &Bytes {
        match self {
            TxOp::Insert { key, .. } | TxOp::Update { key, .. } | TxOp::Delete { key } => key,
        }
    }
}

enum Undo {
    Insert { key: Bytes },
    Reopen { prev_open: RowVersion },
}

impl Transaction {
    pub(crate) fn new(db: DB) -> Self {
        Self {
            db,
            ops: Vec::new(),
        }
    }

    pub fn insert(&mut self, key: impl AsRef<[u8]>, payload: Payload) -> Result<()> {
        self.ops.push(TxOp::Insert {
            key: Bytes::copy_from_slice(key.as_ref()),
            payload,
        });
        Ok(())
    }

    pub fn update(&mut self, key: impl AsRef<[u8]>, payload: Payload) -> Result<()> {
        self.ops.push(TxOp::Update {
            key: Bytes::copy_from_slice(key.as_ref()),
            payload,
        });
        Ok(())
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.ops.push(TxOp::Delete {
            key: Bytes::copy_from_slice(key.as_ref()),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply all buffered operations under one write-lock acquisition.
    pub fn commit(self) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let mut inner = self.db.write_checked()?;

        Self::validate(&inner, &self.ops)?;

        let mut undo: Vec<Undo> = Vec::with_capacity(self.ops.len());
        #[cfg(feature = "wal")]
        let mut logged: Vec<crate::wal::WalCommand> = Vec::with_capacity(self.ops.len());

        for op in &self.ops {
            let step = Self::apply(&mut inner, op, &mut undo);
            match step {
                Ok(_command) => {
                    #[cfg(feature = "wal")]
                    logged.push(_command);
                }
                Err(e) => {
                    Self::rollback(&mut inner, undo);
                    inner.refresh_counts();
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "wal")]
        for command in &logged {
            inner.log_command(command)?;
        }

        Ok(())
    }

    /// Reject the batch up front if any operation would fail, tracking
    /// presence through the op sequence so a transaction may insert, update
    /// and delete the same key.
    fn validate(inner: &DBInner, ops: &[TxOp]) -> Result<()> {
        let mut present: FxHashMap<&Bytes, bool> = FxHashMap::default();

        for op in ops {
            let key = op.key();
            let entry = present
                .entry(key)
                .or_insert_with(|| inner.current.contains(key));

            match op {
                TxOp::Insert { .. } => {
                    if *entry {
                        return Err(ChronicaError::duplicate_key(key));
                    }
                    *entry = true;
                }
                TxOp::Update { .. } => {
                    if !*entry {
                        return Err(ChronicaError::not_found(key));
                    }
                }
                TxOp::Delete { .. } => {
                    if !*entry {
                        return Err(ChronicaError::not_found(key));
                    }
                    *entry = false;
                }
            }
        }

        Ok(())
    }

    #[cfg(feature = "wal")]
    fn apply(
        inner: &mut DBInner,
        op: &TxOp,
        undo: &mut Vec<Undo>,
    ) -> Result<crate::wal::WalCommand> {
        use crate::wal::WalCommand;

        match op {
            TxOp::Insert { key, payload } => {
                let at = inner.apply_insert(key.clone(), payload.clone())?;
                undo.push(Undo::Insert { key: key.clone() });
                Ok(WalCommand::Insert {
                    key: key.clone(),
                    payload: payload.clone(),
                    at,
                })
            }
            TxOp::Update { key, payload } => {
                let prev_open = inner.current.get(key).cloned();
                let at = inner.apply_update(key, payload.clone())?;
                if let Some(prev_open) = prev_open {
                    undo.push(Undo::Reopen { prev_open });
                }
                Ok(WalCommand::Update {
                    key: key.clone(),
                    payload: payload.clone(),
                    at,
                })
            }
            TxOp::Delete { key } => {
                let prev_open = inner.current.get(key).cloned();
                let closed = inner.apply_delete(key)?;
                if let Some(prev_open) = prev_open {
                    undo.push(Undo::Reopen { prev_open });
                }
                Ok(WalCommand::Delete {
                    key: key.clone(),
                    at: closed.valid_to,
                })
            }
        }
    }

    #[cfg(not(feature = "wal"))]
    fn apply(inner: &mut DBInner, op: &TxOp, undo: &mut Vec<Undo>) -> Result<()> {
        match op {
            TxOp::Insert { key, payload } => {
                inner.apply_insert(key.clone(), payload.clone())?;
                undo.push(Undo::Insert { key: key.clone() });
            }
            TxOp::Update { key, payload } => {
                let prev_open = inner.current.get(key).cloned();
                inner.apply_update(key, payload.clone())?;
                if let Some(prev_open) = prev_open {
                    undo.push(Undo::Reopen { prev_open });
                }
            }
            TxOp::Delete { key } => {
                let prev_open = inner.current.get(key).cloned();
                inner.apply_delete(key)?;
                if let Some(prev_open) = prev_open {
                    undo.push(Undo::Reopen { prev_open });
                }
            }
        }
        Ok(())
    }

    fn rollback(inner: &mut DBInner, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Insert { key } => {
                    inner.current.remove(&key);
                }
                Undo::Reopen { prev_open } => {
                    inner.history.remove_last(&prev_open.entity_key);
                    inner.current.restore(prev_open);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Timestamp, Value};

    fn payload(x: i64) -> Payload {
        Payload::new().with("x", Value::Int(x))
    }

    #[test]
    fn test_commit_applies_all() {
        let db = DB::memory().unwrap();

        db.atomic(|tx| {
            tx.insert("a", payload(1))?;
            tx.insert("b", payload(2))?;
            tx.insert("c", payload(3))?;
            Ok(())
        })
        .unwrap();

        assert!(db.contains("a").unwrap());
        assert!(db.contains("b").unwrap());
        assert!(db.contains("c").unwrap());
    }

    #[test]
    fn test_failed_transaction_applies_nothing() {
        let db = DB::memory().unwrap();
        db.insert("existing", payload(0)).unwrap();

        let err = db
            .atomic(|tx| {
                tx.insert("new", payload(1))?;
                tx.update("existing", payload(2))?;
                tx.insert("existing", payload(3))?; // duplicate, rejects the batch
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ChronicaError::DuplicateKey(_)));

        // Nothing from the batch is visible.
        assert!(!db.contains("new").unwrap());
        let live = db.get("existing").unwrap().unwrap();
        assert_eq!(live.payload, payload(0));
        assert_eq!(db.versions("existing").unwrap().len(), 1);
    }

    #[test]
    fn test_update_on_missing_rejects_batch() {
        let db = DB::memory().unwrap();

        let err = db
            .atomic(|tx| {
                tx.insert("a", payload(1))?;
                tx.update("ghost", payload(2))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ChronicaError::NotFound(_)));
        assert!(!db.contains("a").unwrap());
    }

    #[test]
    fn test_same_key_lifecycle_in_one_transaction() {
        let db = DB::memory().unwrap();

        db.atomic(|tx| {
            tx.insert("e1", payload(1))?;
            tx.update("e1", payload(2))?;
            tx.delete("e1")?;
            Ok(())
        })
        .unwrap();

        assert!(!db.contains("e1").unwrap());
        let chain = db.versions("e1").unwrap().into_vec();
        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|v| !v.is_open()));
    }

    #[test]
    fn test_delete_then_reinsert_in_one_transaction() {
        let db = DB::memory().unwrap();
        db.insert("e1", payload(1)).unwrap();

        db.atomic(|tx| {
            tx.delete("e1")?;
            tx.insert("e1", payload(2))?;
            Ok(())
        })
        .unwrap();

        let live = db.get("e1").unwrap().unwrap();
        assert_eq!(live.payload, payload(2));
        assert_eq!(db.versions("e1").unwrap().len(), 2);
    }

    #[test]
    fn test_empty_transaction_commits() {
        let db = DB::memory().unwrap();
        db.transaction().commit().unwrap();
    }

    #[test]
    fn test_dropped_transaction_discards() {
        let db = DB::memory().unwrap();
        {
            let mut tx = db.transaction();
            tx.insert("a", payload(1)).unwrap();
            // dropped without commit
        }
        assert!(!db.contains("a").unwrap());
    }

    #[test]
    fn test_queries_see_transaction_only_after_commit() {
        let db = DB::memory().unwrap();
        let mut tx = db.transaction();
        tx.insert("a", payload(1)).unwrap();

        assert_eq!(db.query_current().unwrap().len(), 0);
        tx.commit().unwrap();
        assert_eq!(db.query_current().unwrap().len(), 1);

        let live = db.query_current().unwrap().into_vec();
        assert!(live[0].valid_from <= Timestamp::OPEN);
    }
}
