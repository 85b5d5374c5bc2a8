// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! In-memory [`KvStore`] implementation.
//!
//! BTreeMap tables under a `parking_lot::RwLock`, per-type counters in a
//! `DashMap`. Scans snapshot the requested range under the read lock, so an
//! iterator never observes writes made after it was created.
//!
//! Used by the test suite and usable as an embedded engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use modelbase_core::error::StorageError;
use modelbase_core::schema::{TypeCatalog, TypeId};

use crate::kv::{BatchOp, KvStore, ScanIter, WriteBatch};

#[derive(Debug, Default)]
struct Table {
    transactional: bool,
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// In-memory engine.
#[derive(Default)]
pub struct MemoryKvStore {
    tables: RwLock<HashMap<String, Table>>,
    /// First free sequence per type; starts at 1, only grows.
    sequences: DashMap<TypeId, AtomicU64>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create one table per catalog type, transactional for
    /// per-record-versioned types.
    pub fn for_catalog(catalog: &TypeCatalog) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for (id, def) in catalog.iter() {
                tables.entry(def.table_name()).or_insert_with(|| Table {
                    transactional: catalog.per_record_versioning(id),
                    rows: BTreeMap::new(),
                });
            }
        }
        store
    }

    /// Number of rows currently in a table. Test/diagnostic helper.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

impl KvStore for MemoryKvStore {
    fn ensure_table(&self, table: &str, transactional: bool) -> Result<(), StorageError> {
        self.tables
            .write()
            .entry(table.to_string())
            .or_insert_with(|| Table {
                transactional,
                rows: BTreeMap::new(),
            });
        Ok(())
    }

    fn is_transactional(&self, table: &str) -> bool {
        self.tables
            .read()
            .get(table)
            .map(|t| t.transactional)
            .unwrap_or(false)
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(table.rows.get(key).cloned())
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        table.rows.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_if(
        &self,
        table: &str,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError> {
        // Compare and write under one write lock: no other writer can
        // slip in between.
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        if table.rows.get(key).map(|v| v.as_slice()) != expected {
            return Ok(false);
        }
        table.rows.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StorageError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(table.rows.remove(key).is_some())
    }

    fn scan<'a>(
        &'a self,
        table: &str,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<ScanIter<'a>, StorageError> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = table
            .rows
            .range(start.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        // Single write lock for the whole batch = atomic apply.
        let mut tables = self.tables.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    tables.entry(table).or_default().rows.insert(key, value);
                }
                BatchOp::Delete { table, key } => {
                    if let Some(t) = tables.get_mut(&table) {
                        t.rows.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn next_sequence(&self, type_id: TypeId) -> u64 {
        self.sequences
            .entry(type_id)
            .or_insert_with(|| AtomicU64::new(1))
            .fetch_add(1, Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table(name: &str, transactional: bool) -> MemoryKvStore {
        let store = MemoryKvStore::new();
        store.ensure_table(name, transactional).unwrap();
        store
    }

    #[test]
    fn test_put_get_delete() {
        let store = store_with_table("t", false);
        assert_eq!(store.get("t", b"k").unwrap(), None);

        store.put("t", b"k", b"v").unwrap();
        assert_eq!(store.get("t", b"k").unwrap(), Some(b"v".to_vec()));

        assert!(store.delete("t", b"k").unwrap());
        assert!(!store.delete("t", b"k").unwrap());
    }

    #[test]
    fn test_unknown_table() {
        let store = MemoryKvStore::new();
        assert!(matches!(
            store.get("nope", b"k"),
            Err(StorageError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_scan_prefix_and_start() {
        let store = store_with_table("t", false);
        for k in [&b"aa1"[..], b"aa2", b"aa3", b"ab1"] {
            store.put("t", k, b"v").unwrap();
        }

        let keys: Vec<Vec<u8>> = store
            .scan("t", b"aa", b"aa2")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"aa2".to_vec(), b"aa3".to_vec()]);
    }

    #[test]
    fn test_batch_commit_is_atomic_snapshot() {
        let store = store_with_table("t", true);
        store.put("t", b"old", b"1").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("t", b"new".to_vec(), b"2".to_vec());
        batch.delete("t", b"old".to_vec());
        store.commit(batch).unwrap();

        assert_eq!(store.get("t", b"new").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("t", b"old").unwrap(), None);
    }

    #[test]
    fn test_put_if_compares_current_bytes() {
        let store = store_with_table("t", true);

        // Absent key: only `None` wins.
        assert!(store.put_if("t", b"k", None, b"v1").unwrap());
        assert!(!store.put_if("t", b"k", None, b"v2").unwrap());

        assert!(!store.put_if("t", b"k", Some(b"stale"), b"v2").unwrap());
        assert_eq!(store.get("t", b"k").unwrap(), Some(b"v1".to_vec()));

        assert!(store.put_if("t", b"k", Some(b"v1"), b"v2").unwrap());
        assert_eq!(store.get("t", b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_sequences_grow_and_survive() {
        let store = MemoryKvStore::new();
        let t = TypeId::from_index(3);
        assert_eq!(store.next_sequence(t), 1);
        assert_eq!(store.next_sequence(t), 2);
        // Counters are global engine state; nothing resets them.
        assert_eq!(store.next_sequence(t), 3);
    }
}
