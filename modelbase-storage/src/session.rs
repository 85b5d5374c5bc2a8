// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! One checkin's logical transaction scope.
//!
//! A [`Session`] wraps the raw engine with the two storage disciplines the
//! pipeline relies on:
//!
//! - writes to **transactional** (per-record-versioned) tables are staged
//!   in the session and applied atomically by [`Session::commit`]; abort
//!   discards them and the engine never sees them;
//! - writes to **non-transactional** (counter-versioned) tables go through
//!   to the engine immediately. They survive an abort, which is why the
//!   rollback engine exists.
//!
//! The session also owns per-type OID allocation (snapshotting the start
//! oid the first time a type allocates — the frontier of "created in this
//! revision"), MVCC object reads (newest version at or below a revision),
//! and the post-commit action queue: actions registered during the checkin
//! run strictly after the durable commit, in registration order, each in
//! its own fresh session so one failure cannot undo the checkin.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::sync::Arc;

use modelbase_core::error::{CheckinError, StorageError};
use modelbase_core::model::Entity;
use modelbase_core::object::{Oid, VirtualObject};
use modelbase_core::schema::{TypeCatalog, TypeId};

use crate::keys::RecordKey;
use crate::kv::{KeyValue, KvStore, ScanIter, WriteBatch};

/// A side effect that must only run after the enclosing transaction
/// durably commits.
pub trait PostCommitAction: Send {
    fn execute(&self, session: &mut Session) -> Result<(), CheckinError>;
}

impl<F> PostCommitAction for F
where
    F: Fn(&mut Session) -> Result<(), CheckinError> + Send,
{
    fn execute(&self, session: &mut Session) -> Result<(), CheckinError> {
        self(session)
    }
}

/// One checkin's transaction scope over the engine.
pub struct Session {
    store: Arc<dyn KvStore>,
    catalog: Arc<TypeCatalog>,
    /// Staged writes for transactional tables: `(table, key) -> value`,
    /// `None` marking a staged delete.
    staged: BTreeMap<(String, Vec<u8>), Option<Vec<u8>>>,
    /// First oid allocated per type during this session.
    start_oids: HashMap<TypeId, Oid>,
    post_commit: Vec<Box<dyn PostCommitAction>>,
    committed: bool,
}

impl Session {
    pub fn new(store: Arc<dyn KvStore>, catalog: Arc<TypeCatalog>) -> Self {
        Self {
            store,
            catalog,
            staged: BTreeMap::new(),
            start_oids: HashMap::new(),
            post_commit: Vec::new(),
            committed: false,
        }
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // =========================================================================
    // OID allocation
    // =========================================================================

    /// Allocate the next oid of a type, recording the per-type start oid on
    /// the first allocation.
    pub fn new_oid(&mut self, type_id: TypeId) -> Oid {
        let sequence = self.store.next_sequence(type_id);
        let oid = Oid::new(type_id, sequence);
        self.start_oids.entry(type_id).or_insert(oid);
        oid
    }

    /// Allocate an oid for a store entity type.
    pub fn new_entity_oid<E: Entity>(&mut self) -> Result<Oid, StorageError> {
        let type_id = self.catalog.id_of(E::TYPE_NAME).ok_or_else(|| {
            StorageError::Engine(format!("entity type {} not in catalog", E::TYPE_NAME))
        })?;
        Ok(self.new_oid(type_id))
    }

    /// Per-type start-OID snapshot: the frontier of oids created by this
    /// session. Empty until the first allocation.
    pub fn start_oids(&self) -> &HashMap<TypeId, Oid> {
        &self.start_oids
    }

    // =========================================================================
    // Object records
    // =========================================================================

    /// Write a typed record under `(pid, oid, rid)`. Staged or
    /// write-through depending on the owning type's storage discipline.
    pub fn put_object(
        &mut self,
        pid: u32,
        rid: u32,
        object: &VirtualObject,
    ) -> Result<(), StorageError> {
        let table = self.catalog.table_name(object.type_id());
        let key = RecordKey::new(pid, object.oid(), rid).encode().to_vec();
        let value =
            bincode::serialize(object).map_err(|e| StorageError::Codec(e.to_string()))?;
        if self.store.is_transactional(&table) {
            self.staged.insert((table, key), Some(value));
            Ok(())
        } else {
            self.store.put(&table, &key, &value)
        }
    }

    /// MVCC read: the newest version of `oid` with revision `<= max_rid`,
    /// returned together with the revision it was written under. Staged
    /// writes of this session overlay the engine's committed state.
    pub fn get_object(
        &self,
        pid: u32,
        oid: Oid,
        max_rid: u32,
    ) -> Result<Option<(VirtualObject, u32)>, StorageError> {
        let table = self.catalog.table_name(oid.type_id());
        let start = RecordKey::oid_start(pid, oid);
        // Keys sort newest revision first; the first match wins and the
        // rest of the range is never pulled.
        for entry in self.merged_range(&table, &start, &start)? {
            let (key, value) = entry?;
            let decoded = RecordKey::decode(&key)?;
            if decoded.rid <= max_rid {
                let object: VirtualObject = bincode::deserialize(&value)
                    .map_err(|e| StorageError::Codec(e.to_string()))?;
                return Ok(Some((object, decoded.rid)));
            }
        }
        Ok(None)
    }

    /// Stream the objects of one type written under exactly revision `rid`
    /// in project `pid`, in ascending oid order. Records are decoded one at
    /// a time as the caller consumes the iterator.
    pub fn objects_in_revision<'s>(
        &'s self,
        pid: u32,
        type_id: TypeId,
        rid: u32,
    ) -> Result<impl Iterator<Item = Result<VirtualObject, StorageError>> + 's, StorageError>
    {
        let table = self.catalog.table_name(type_id);
        let prefix = RecordKey::project_prefix(pid);
        let merged = self.merged_range(&table, &prefix, &prefix)?;
        Ok(merged.filter_map(move |entry| {
            let (key, value) = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let decoded = match RecordKey::decode(&key) {
                Ok(decoded) => decoded,
                Err(e) => return Some(Err(e)),
            };
            if decoded.rid != rid {
                return None;
            }
            Some(
                bincode::deserialize::<VirtualObject>(&value)
                    .map_err(|e| StorageError::Codec(e.to_string())),
            )
        }))
    }

    /// Engine range merged with this session's staged writes for the same
    /// table. Ascending key order; staged entries override engine rows and
    /// staged deletes suppress them. The merge is lazy: nothing is pulled
    /// from the engine until the caller consumes it.
    fn merged_range<'s>(
        &'s self,
        table: &str,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<impl Iterator<Item = Result<KeyValue, StorageError>> + 's, StorageError> {
        let engine = self.store.scan(table, prefix, start)?;
        let from = (table.to_string(), start.to_vec());
        let table = table.to_string();
        let prefix = prefix.to_vec();
        let staged = self
            .staged
            .range(from..)
            .take_while(move |entry| {
                let (t, key) = entry.0;
                *t == table && key.starts_with(prefix.as_slice())
            })
            .map(|((_, key), value)| (key.clone(), value.clone()));
        Ok(MergedScan {
            engine: engine.peekable(),
            staged: staged.peekable(),
        })
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Stage a store entity write. Entity tables are always transactional.
    pub fn store_entity<E: Entity>(&mut self, entity: &E) -> Result<(), StorageError> {
        let key = entity.oid().as_u64().to_be_bytes().to_vec();
        let value =
            bincode::serialize(entity).map_err(|e| StorageError::Codec(e.to_string()))?;
        self.staged.insert((E::TABLE.to_string(), key), Some(value));
        Ok(())
    }

    /// Guarded overwrite of a stored entity: the write succeeds only if the
    /// stored bytes still match `expected`'s serialized form. Durable
    /// immediately, independent of this session's staged writes; a
    /// concurrent writer surfaces as [`StorageError::LockConflict`].
    pub fn swap_entity<E: Entity>(&self, expected: &E, updated: &E) -> Result<(), StorageError> {
        let key = expected.oid().as_u64().to_be_bytes();
        let current =
            bincode::serialize(expected).map_err(|e| StorageError::Codec(e.to_string()))?;
        let next =
            bincode::serialize(updated).map_err(|e| StorageError::Codec(e.to_string()))?;
        if !self.store.put_if(E::TABLE, &key, Some(&current), &next)? {
            return Err(StorageError::LockConflict(E::TABLE.to_string()));
        }
        Ok(())
    }

    pub fn fetch_entity<E: Entity>(&self, oid: Oid) -> Result<Option<E>, StorageError> {
        let key = oid.as_u64().to_be_bytes().to_vec();
        let raw = match self.staged.get(&(E::TABLE.to_string(), key.clone())) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => self.store.get(E::TABLE, &key)?,
        };
        raw.map(|bytes| {
            bincode::deserialize::<E>(&bytes).map_err(|e| StorageError::Codec(e.to_string()))
        })
        .transpose()
    }

    // =========================================================================
    // Post-commit actions / commit / abort
    // =========================================================================

    /// Register a side effect to run only after the durable commit.
    pub fn add_post_commit(&mut self, action: Box<dyn PostCommitAction>) {
        self.post_commit.push(action);
    }

    /// Atomically apply staged writes, then drain post-commit actions in
    /// registration order, each in its own fresh session. Action failures
    /// are logged and never reopen the checkin.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        if self.committed {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for ((table, key), value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => batch.put(table, key, value),
                None => batch.delete(table, key),
            }
        }
        self.store.commit(batch)?;
        self.committed = true;

        for action in std::mem::take(&mut self.post_commit) {
            let mut session = Session::new(self.store.clone(), self.catalog.clone());
            let outcome = action
                .execute(&mut session)
                .and_then(|()| session.commit().map_err(CheckinError::from));
            if let Err(e) = outcome {
                tracing::error!(error = %e, "post-commit action failed");
            }
        }
        Ok(())
    }

    /// Discard staged writes and registered actions. Write-through records
    /// already in non-transactional tables are the rollback engine's job.
    pub fn abort(&mut self) {
        let staged = self.staged.len();
        let actions = self.post_commit.len();
        self.staged.clear();
        self.post_commit.clear();
        if staged > 0 || actions > 0 {
            tracing::debug!(staged, actions, "session aborted");
        }
    }
}

// =============================================================================
// Merged scans
// =============================================================================

/// Two-way ordered merge behind [`Session::merged_range`]: the engine's
/// scan on one side, this session's staged overlay on the other.
struct MergedScan<'a, S>
where
    S: Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
{
    engine: Peekable<ScanIter<'a>>,
    staged: Peekable<S>,
}

enum MergeSide {
    Engine,
    Staged,
    Both,
}

impl<S> Iterator for MergedScan<'_, S>
where
    S: Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
{
    type Item = Result<KeyValue, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let side = match (self.engine.peek(), self.staged.peek()) {
                (None, None) => return None,
                // Engine faults surface as soon as they are reached.
                (Some(Err(_)), _) => MergeSide::Engine,
                (Some(Ok((engine_key, _))), Some((staged_key, _))) => {
                    match staged_key.cmp(engine_key) {
                        Ordering::Less => MergeSide::Staged,
                        Ordering::Equal => MergeSide::Both,
                        Ordering::Greater => MergeSide::Engine,
                    }
                }
                (None, Some(_)) => MergeSide::Staged,
                (Some(Ok(_)), None) => MergeSide::Engine,
            };
            match side {
                MergeSide::Engine => return self.engine.next(),
                MergeSide::Staged | MergeSide::Both => {
                    if matches!(side, MergeSide::Both) {
                        // The staged entry shadows the engine row.
                        self.engine.next();
                    }
                    let (key, value) = self.staged.next()?;
                    match value {
                        Some(value) => return Some(Ok((key, value))),
                        // A staged delete suppresses the row entirely.
                        None => continue,
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use modelbase_core::model::{register_store_types, Project};
    use modelbase_core::object::FieldValue;
    use modelbase_core::schema::TypeDef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture() -> (Arc<dyn KvStore>, Arc<TypeCatalog>, TypeId, TypeId) {
        let mut catalog = TypeCatalog::new();
        let wall = catalog.register(TypeDef::new("model", "Wall"));
        let sheet = catalog.register(TypeDef::new("model", "Sheet").per_record_versioned());
        register_store_types(&mut catalog);
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::for_catalog(&catalog));
        (store, Arc::new(catalog), wall, sheet)
    }

    fn wall_object(session: &mut Session, wall: TypeId, name: &str) -> VirtualObject {
        let oid = session.new_oid(wall);
        let mut object = VirtualObject::new(oid);
        object.set("Name", FieldValue::Text(name.into()));
        object
    }

    #[test]
    fn test_counter_versioned_writes_go_through_immediately() {
        let (store, catalog, wall, _) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());

        let object = wall_object(&mut session, wall, "W1");
        session.put_object(1, 1, &object).unwrap();

        // Visible to an unrelated session before commit.
        let other = Session::new(store, catalog);
        let (read, rid) = other.get_object(1, object.oid(), 1).unwrap().unwrap();
        assert_eq!(read, object);
        assert_eq!(rid, 1);
    }

    #[test]
    fn test_transactional_writes_are_staged_until_commit() {
        let (store, catalog, _, sheet) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());

        let oid = session.new_oid(sheet);
        let object = VirtualObject::new(oid);
        session.put_object(1, 1, &object).unwrap();

        // Own session sees the staged write; others do not.
        assert!(session.get_object(1, oid, 1).unwrap().is_some());
        let other = Session::new(store.clone(), catalog.clone());
        assert!(other.get_object(1, oid, 1).unwrap().is_none());

        session.commit().unwrap();
        let other = Session::new(store, catalog);
        assert!(other.get_object(1, oid, 1).unwrap().is_some());
    }

    #[test]
    fn test_abort_discards_staged_writes() {
        let (store, catalog, _, sheet) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());
        let oid = session.new_oid(sheet);
        session.put_object(1, 1, &VirtualObject::new(oid)).unwrap();
        session.abort();

        // Even committing afterwards flushes nothing.
        session.commit().unwrap();
        let fresh = Session::new(store, catalog);
        assert!(fresh.get_object(1, oid, 1).unwrap().is_none());
    }

    #[test]
    fn test_mvcc_read_takes_newest_at_or_below_rid() {
        let (store, catalog, wall, _) = fixture();
        let mut session = Session::new(store, catalog);

        let oid = session.new_oid(wall);
        let mut v1 = VirtualObject::new(oid);
        v1.set("Name", FieldValue::Text("v1".into()));
        let mut v3 = VirtualObject::new(oid);
        v3.set("Name", FieldValue::Text("v3".into()));

        session.put_object(1, 1, &v1).unwrap();
        session.put_object(1, 3, &v3).unwrap();

        let (read, rid) = session.get_object(1, oid, 2).unwrap().unwrap();
        assert_eq!(read, v1);
        assert_eq!(rid, 1);

        let (read, rid) = session.get_object(1, oid, 5).unwrap().unwrap();
        assert_eq!(read, v3);
        assert_eq!(rid, 3);
    }

    #[test]
    fn test_objects_in_revision_filters_exact_rid() {
        let (store, catalog, wall, _) = fixture();
        let mut session = Session::new(store, catalog);

        let a = wall_object(&mut session, wall, "A");
        let b = wall_object(&mut session, wall, "B");
        session.put_object(1, 1, &a).unwrap();
        session.put_object(1, 2, &b).unwrap();

        let in_rev2: Vec<VirtualObject> = session
            .objects_in_revision(1, wall, 2)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(in_rev2, vec![b]);
    }

    #[test]
    fn test_start_oids_snapshot_first_allocation() {
        let (store, catalog, wall, _) = fixture();

        // A previous checkin consumed some sequences.
        {
            let mut earlier = Session::new(store.clone(), catalog.clone());
            earlier.new_oid(wall);
            earlier.new_oid(wall);
        }

        let mut session = Session::new(store, catalog);
        assert!(session.start_oids().is_empty());
        let first = session.new_oid(wall);
        session.new_oid(wall);
        assert_eq!(session.start_oids()[&wall], first);
        assert_eq!(first.sequence(), 3);
    }

    #[test]
    fn test_entity_round_trip_through_staging() {
        let (store, catalog, _, _) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());

        let poid = session.new_entity_oid::<Project>().unwrap();
        let project = Project::new(poid, 1, "p1");
        session.store_entity(&project).unwrap();

        let staged: Project = session.fetch_entity(poid).unwrap().unwrap();
        assert_eq!(staged.name, "p1");

        session.commit().unwrap();
        let fresh = Session::new(store, catalog);
        let committed: Project = fresh.fetch_entity(poid).unwrap().unwrap();
        assert_eq!(committed.name, "p1");
    }

    #[test]
    fn test_post_commit_runs_in_order_after_commit_only() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let (store, catalog, _, _) = fixture();
        let mut session = Session::new(store.clone(), catalog.clone());

        session.add_post_commit(Box::new(|_: &mut Session| -> Result<(), CheckinError> {
            // First action observes the counter at zero.
            assert_eq!(COUNTER.fetch_add(1, Ordering::SeqCst), 0);
            Ok(())
        }));
        session.add_post_commit(Box::new(|_: &mut Session| -> Result<(), CheckinError> {
            assert_eq!(COUNTER.fetch_add(1, Ordering::SeqCst), 1);
            Ok(())
        }));

        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);
        session.commit().unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
    }

    /// Engine wrapper counting how many records callers actually pull out
    /// of a scan.
    struct CountingStore {
        inner: MemoryKvStore,
        pulled: Arc<AtomicUsize>,
    }

    impl KvStore for CountingStore {
        fn ensure_table(&self, table: &str, transactional: bool) -> Result<(), StorageError> {
            self.inner.ensure_table(table, transactional)
        }

        fn is_transactional(&self, table: &str) -> bool {
            self.inner.is_transactional(table)
        }

        fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(table, key)
        }

        fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
            self.inner.put(table, key, value)
        }

        fn put_if(
            &self,
            table: &str,
            key: &[u8],
            expected: Option<&[u8]>,
            value: &[u8],
        ) -> Result<bool, StorageError> {
            self.inner.put_if(table, key, expected, value)
        }

        fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StorageError> {
            self.inner.delete(table, key)
        }

        fn scan<'a>(
            &'a self,
            table: &str,
            prefix: &[u8],
            start: &[u8],
        ) -> Result<crate::kv::ScanIter<'a>, StorageError> {
            let scan = self.inner.scan(table, prefix, start)?;
            let pulled = self.pulled.clone();
            Ok(Box::new(scan.map(move |entry| {
                pulled.fetch_add(1, Ordering::SeqCst);
                entry
            })))
        }

        fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
            self.inner.commit(batch)
        }

        fn next_sequence(&self, type_id: TypeId) -> u64 {
            self.inner.next_sequence(type_id)
        }
    }

    #[test]
    fn test_reads_pull_from_the_engine_lazily() {
        let mut catalog = TypeCatalog::new();
        let wall = catalog.register(TypeDef::new("model", "Wall"));
        register_store_types(&mut catalog);
        let pulled = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(CountingStore {
            inner: MemoryKvStore::for_catalog(&catalog),
            pulled: pulled.clone(),
        });
        let mut session = Session::new(store, Arc::new(catalog));

        let mut oids = Vec::new();
        for _ in 0..64 {
            let oid = session.new_oid(wall);
            session.put_object(1, 1, &VirtualObject::new(oid)).unwrap();
            oids.push(oid);
        }

        // Point read: one record crosses the engine boundary, not the
        // whole range.
        pulled.store(0, Ordering::SeqCst);
        session.get_object(1, oids[0], 1).unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        // Streaming read: records cross only as the caller consumes them.
        pulled.store(0, Ordering::SeqCst);
        let mut objects = session.objects_in_revision(1, wall, 1).unwrap();
        objects.next().unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        objects.next().unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_staged_overlay_interleaves_with_engine_rows() {
        let (store, catalog, _, sheet) = fixture();

        let mut earlier = Session::new(store.clone(), catalog.clone());
        let oid = earlier.new_oid(sheet);
        let mut v1 = VirtualObject::new(oid);
        v1.set("Name", FieldValue::Text("v1".into()));
        earlier.put_object(1, 1, &v1).unwrap();
        earlier.commit().unwrap();

        let mut session = Session::new(store, catalog);
        let mut v2 = VirtualObject::new(oid);
        v2.set("Name", FieldValue::Text("v2".into()));
        session.put_object(1, 2, &v2).unwrap();
        let fresh = VirtualObject::new(session.new_oid(sheet));
        session.put_object(1, 2, &fresh).unwrap();

        // Newest staged version shadows the committed one; the committed
        // one is still reachable below its revision.
        let (read, rid) = session.get_object(1, oid, 9).unwrap().unwrap();
        assert_eq!((read, rid), (v2.clone(), 2));
        let (read, rid) = session.get_object(1, oid, 1).unwrap().unwrap();
        assert_eq!((read, rid), (v1, 1));

        let in_rev2: Vec<VirtualObject> = session
            .objects_in_revision(1, sheet, 2)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(in_rev2, vec![v2, fresh]);
    }

    #[test]
    fn test_swap_entity_detects_concurrent_writer() {
        let (store, catalog, _, _) = fixture();
        let mut setup = Session::new(store.clone(), catalog.clone());
        let poid = setup.new_entity_oid::<Project>().unwrap();
        let project = Project::new(poid, 1, "p1");
        setup.store_entity(&project).unwrap();
        setup.commit().unwrap();

        // Two writers fetch the same stored state.
        let one = Session::new(store.clone(), catalog.clone());
        let two = Session::new(store.clone(), catalog.clone());
        let seen_by_one: Project = one.fetch_entity(poid).unwrap().unwrap();
        let seen_by_two: Project = two.fetch_entity(poid).unwrap().unwrap();

        let mut locked_by_one = seen_by_one.clone();
        locked_by_one.begin_checkin().unwrap();
        let mut locked_by_two = seen_by_two.clone();
        locked_by_two.begin_checkin().unwrap();

        one.swap_entity(&seen_by_one, &locked_by_one).unwrap();
        assert!(matches!(
            two.swap_entity(&seen_by_two, &locked_by_two),
            Err(StorageError::LockConflict(_))
        ));

        // The first writer's state is what's stored.
        let fresh = Session::new(store, catalog);
        let stored: Project = fresh.fetch_entity(poid).unwrap().unwrap();
        assert_eq!(stored.checkin_state, locked_by_one.checkin_state);
    }

    #[test]
    fn test_post_commit_never_runs_on_abort() {
        static RAN: AtomicUsize = AtomicUsize::new(0);
        let (store, catalog, _, _) = fixture();
        let mut session = Session::new(store, catalog);
        session.add_post_commit(Box::new(|_: &mut Session| -> Result<(), CheckinError> {
            RAN.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        session.abort();
        drop(session);
        assert_eq!(RAN.load(Ordering::SeqCst), 0);
    }
}
