// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The raw key-value engine boundary.
//!
//! The checkin pipeline programs against this trait only. The engine is
//! expected to supply:
//!
//! - durable point writes (`put`/`delete`) for non-transactional tables —
//!   these hit storage immediately and survive an aborted checkin, which is
//!   exactly why counter-versioned tables need the manual rollback sweep;
//! - an atomic `commit` of a [`WriteBatch`] — the transaction primitive
//!   backing per-record-versioned tables;
//! - ordered range scans for rollback and MVCC reads;
//! - a guarded `put_if` write — the primitive behind the single-writer
//!   project lock;
//! - grow-only per-type OID counters that survive aborts.

use modelbase_core::error::StorageError;
use modelbase_core::schema::TypeId;

/// A key/value pair as returned by range scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Streaming scan handle. Engines may buffer internally, but callers treat
/// the iteration as a snapshot of the range at scan time.
pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<KeyValue, StorageError>> + 'a>;

#[derive(Debug, Clone)]
pub(crate) enum BatchOp {
    Put {
        table: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: String,
        key: Vec<u8>,
    },
}

/// Writes staged for one atomic commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: impl Into<String>, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            table: table.into(),
            key,
            value,
        });
    }

    pub fn delete(&mut self, table: impl Into<String>, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete {
            table: table.into(),
            key,
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The staged ops, in staging order.
    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// The underlying key-value engine.
pub trait KvStore: Send + Sync {
    /// Create a table if it does not exist. `transactional` tables take
    /// part in batch commits and roll back with the engine; others are
    /// written through immediately.
    fn ensure_table(&self, table: &str, transactional: bool) -> Result<(), StorageError>;

    /// Whether the table's versioning/rollback is handled by the engine.
    fn is_transactional(&self, table: &str) -> bool;

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Immediate durable write (the non-transactional path).
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Guarded write: store `value` only if the key's current bytes equal
    /// `expected` (`None` meaning the key must be absent). Atomic with
    /// respect to every other write. Returns whether the write happened.
    fn put_if(
        &self,
        table: &str,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError>;

    /// Immediate durable delete. Returns whether the key existed.
    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StorageError>;

    /// Scan keys `>= start` that begin with `prefix`, in ascending key
    /// order.
    fn scan<'a>(
        &'a self,
        table: &str,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<ScanIter<'a>, StorageError>;

    /// Atomically apply a batch (the engine's transaction commit).
    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Allocate the next free per-type sequence number. Counters only grow
    /// and are not rolled back on abort.
    fn next_sequence(&self, type_id: TypeId) -> u64;
}
