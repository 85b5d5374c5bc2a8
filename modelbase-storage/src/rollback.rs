// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Manual rollback of a failed or cancelled checkin.
//!
//! Per-record-versioned tables need no action here: the engine's own
//! transaction abort discards their writes. Counter-versioned tables were
//! written through immediately, so every record the aborted revision
//! created must be found and deleted by hand.
//!
//! The sweep is best-effort by contract: the revision is already known
//! aborted, so a storage fault in one table is logged and the sweep moves
//! on to the next. Running the sweep twice is harmless — the second pass
//! finds nothing to delete.

use std::collections::HashMap;

use modelbase_core::object::Oid;
use modelbase_core::schema::{TypeCatalog, TypeId};

use crate::keys::RecordKey;
use crate::kv::KvStore;

/// Outcome of one rollback sweep, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackStats {
    /// Records deleted across all tables.
    pub deleted: u64,
    /// Counter-versioned tables scanned.
    pub tables_scanned: u32,
    /// Tables whose scan or delete faulted (logged, not escalated).
    pub tables_failed: u32,
}

/// Delete every record that revision `rid` of project `pid` wrote to a
/// counter-versioned table, using the per-type start-OID snapshot as the
/// range lower bound.
pub fn rollback(
    store: &dyn KvStore,
    catalog: &TypeCatalog,
    pid: u32,
    rid: u32,
    start_oids: &HashMap<TypeId, Oid>,
) -> RollbackStats {
    tracing::info!(pid, rid, "rolling back");
    let mut stats = RollbackStats::default();

    // Deterministic sweep order for reproducible diagnostics.
    let mut types: Vec<(TypeId, Oid)> = start_oids.iter().map(|(t, o)| (*t, *o)).collect();
    types.sort_by_key(|(t, _)| *t);

    for (type_id, start_oid) in types {
        let table = catalog.table_name(type_id);
        if store.is_transactional(&table) {
            // Engine transaction abort already covered this table.
            continue;
        }
        stats.tables_scanned += 1;
        match sweep_table(store, &table, pid, rid, start_oid) {
            Ok(deleted) => stats.deleted += deleted,
            Err(e) => {
                stats.tables_failed += 1;
                tracing::warn!(table = %table, error = %e, "rollback sweep failed for table");
            }
        }
    }

    tracing::info!(deleted = stats.deleted, "deleted objects in rollback");
    stats
}

fn sweep_table(
    store: &dyn KvStore,
    table: &str,
    pid: u32,
    rid: u32,
    start_oid: Oid,
) -> Result<u64, modelbase_core::error::StorageError> {
    let prefix = RecordKey::project_prefix(pid);
    let start = RecordKey::oid_start(pid, start_oid);
    let mut deleted = 0u64;
    for entry in store.scan(table, &prefix, &start)? {
        let (key, _) = entry?;
        let decoded = RecordKey::decode(&key)?;
        if decoded.rid == rid && store.delete(table, &key)? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use crate::session::Session;
    use modelbase_core::object::VirtualObject;
    use modelbase_core::schema::TypeDef;
    use std::sync::Arc;

    fn fixture() -> (Arc<MemoryKvStore>, Arc<TypeCatalog>, TypeId, TypeId) {
        let mut catalog = TypeCatalog::new();
        let wall = catalog.register(TypeDef::new("model", "Wall"));
        let sheet = catalog.register(TypeDef::new("model", "Sheet").per_record_versioned());
        let store = Arc::new(MemoryKvStore::for_catalog(&catalog));
        (store, Arc::new(catalog), wall, sheet)
    }

    fn write_walls(
        session: &mut Session,
        wall: TypeId,
        pid: u32,
        rid: u32,
        count: usize,
    ) -> Vec<Oid> {
        (0..count)
            .map(|_| {
                let oid = session.new_oid(wall);
                session.put_object(pid, rid, &VirtualObject::new(oid)).unwrap();
                oid
            })
            .collect()
    }

    #[test]
    fn test_deletes_only_the_aborted_revision() {
        let (store, catalog, wall, _) = fixture();
        let table = catalog.table_name(wall);

        // Revision 1 commits; revision 2 aborts.
        let mut s1 = Session::new(store.clone(), catalog.clone());
        write_walls(&mut s1, wall, 1, 1, 3);

        let mut s2 = Session::new(store.clone(), catalog.clone());
        write_walls(&mut s2, wall, 1, 2, 5);
        assert_eq!(store.row_count(&table), 8);

        let stats = rollback(store.as_ref(), &catalog, 1, 2, s2.start_oids());
        assert_eq!(stats.deleted, 5);
        assert_eq!(stats.tables_failed, 0);
        assert_eq!(store.row_count(&table), 3);
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let (store, catalog, wall, _) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());
        write_walls(&mut session, wall, 1, 1, 4);

        let first = rollback(store.as_ref(), &catalog, 1, 1, session.start_oids());
        assert_eq!(first.deleted, 4);

        let second = rollback(store.as_ref(), &catalog, 1, 1, session.start_oids());
        assert_eq!(second.deleted, 0);
    }

    #[test]
    fn test_per_record_versioned_tables_are_never_touched() {
        let (store, catalog, _, sheet) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());
        let oid = session.new_oid(sheet);
        session.put_object(1, 1, &VirtualObject::new(oid)).unwrap();
        session.commit().unwrap();

        let table = catalog.table_name(sheet);
        assert_eq!(store.row_count(&table), 1);

        let stats = rollback(store.as_ref(), &catalog, 1, 1, session.start_oids());
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.tables_scanned, 0);
        assert_eq!(store.row_count(&table), 1);
    }

    #[test]
    fn test_start_oid_bounds_the_scan() {
        let (store, catalog, wall, _) = fixture();

        // Same revision id in a previous, committed concrete revision would
        // be impossible; simulate older data below the frontier instead.
        let mut s1 = Session::new(store.clone(), catalog.clone());
        write_walls(&mut s1, wall, 1, 1, 2);

        let mut s2 = Session::new(store.clone(), catalog.clone());
        write_walls(&mut s2, wall, 1, 2, 2);

        // The frontier of s2 excludes s1's oids even if rids collided.
        let stats = rollback(store.as_ref(), &catalog, 1, 2, s2.start_oids());
        assert_eq!(stats.deleted, 2);
        let table = catalog.table_name(wall);
        assert_eq!(store.row_count(&table), 2);
    }

    #[test]
    fn test_faulting_table_does_not_abort_sweep() {
        let (store, catalog, wall, _) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());
        write_walls(&mut session, wall, 1, 1, 2);

        // A type whose table was never created in the engine: its scan
        // faults with UnknownTable, and the sweep moves on.
        let mut catalog2 = TypeCatalog::new();
        catalog2.register(TypeDef::new("model", "Wall"));
        catalog2.register(TypeDef::new("model", "Sheet").per_record_versioned());
        let ghost = catalog2.register(TypeDef::new("model", "Ghost"));

        let mut start_oids = session.start_oids().clone();
        start_oids.insert(ghost, Oid::new(ghost, 1));

        let stats = rollback(store.as_ref(), &catalog2, 1, 1, &start_oids);
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.tables_failed, 1);
    }
}
