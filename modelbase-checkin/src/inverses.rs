// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Inverse reference fixup.
//!
//! The streaming write is forward-only: a record's reference fields hold
//! bare oids and the referenced objects are untouched. This pass walks
//! every forward reference that declares an inverse and patches the
//! opposite field on the referenced object, so that bidirectional
//! relationships read consistently in both directions.
//!
//! Each referenced object is fetched at most once into a patch cache and
//! written back at most once, at the revision it was originally written
//! under. Objects whose type declares no inverse-bearing field are never
//! scanned.

use std::collections::HashMap;

use modelbase_core::error::{CheckinError, StorageError};
use modelbase_core::object::{Oid, VirtualObject};
use modelbase_core::schema::{FieldDef, Multiplicity, TypeCatalog, TypeId};
use modelbase_storage::Session;

use crate::context::QueryContext;

struct PatchedObject {
    object: VirtualObject,
    /// Revision the object was originally written under; the write-back
    /// overwrites that exact version.
    rid: u32,
    dirty: bool,
}

/// Patch opposite references for every inverse-bearing forward reference
/// written in the revision `ctx` identifies. Returns the number of objects
/// rewritten.
///
/// A forward reference to an oid with no stored object is a
/// [`StorageError::DanglingReference`] and aborts the pass. A referenced
/// type that does not declare the opposite field is skipped: silently when
/// the catalog exempts the pair, with a warning otherwise.
pub fn fix_inverses(
    session: &mut Session,
    ctx: &QueryContext,
    summary_types: &[TypeId],
    progress: &mut dyn FnMut(&str, Option<u32>),
) -> Result<u64, CheckinError> {
    let catalog = session.catalog().clone();
    let mut cache: HashMap<Oid, PatchedObject> = HashMap::new();

    let with_inverses: Vec<TypeId> = summary_types
        .iter()
        .copied()
        .filter(|t| catalog.has_inverses(*t))
        .collect();

    for (index, type_id) in with_inverses.iter().enumerate() {
        progress(
            "Generating inverses",
            Some((100 * (index + 1) / with_inverses.len()) as u32),
        );
        let forward_fields: Vec<FieldDef> =
            catalog.inverse_fields(*type_id).cloned().collect();

        for object in session.objects_in_revision(ctx.pid, *type_id, ctx.rid)? {
            let object = object?;
            for field in &forward_fields {
                for target in object.referenced_oids(&field.name).to_vec() {
                    patch_opposite(session, &catalog, &mut cache, ctx, &object, field, target)?;
                }
            }
        }
    }

    progress("Storing data", None);
    let mut written = 0u64;
    for patched in cache.into_values() {
        if patched.dirty {
            session.put_object(ctx.pid, patched.rid, &patched.object)?;
            written += 1;
        }
    }
    tracing::debug!(written, rid = ctx.rid, "inverse fixup complete");
    Ok(written)
}

fn patch_opposite(
    session: &Session,
    catalog: &TypeCatalog,
    cache: &mut HashMap<Oid, PatchedObject>,
    ctx: &QueryContext,
    source: &VirtualObject,
    forward: &FieldDef,
    target: Oid,
) -> Result<(), CheckinError> {
    if !cache.contains_key(&target) {
        let (object, rid) = session
            .get_object(ctx.pid, target, ctx.rid)?
            .ok_or_else(|| StorageError::DanglingReference {
                oid: target,
                type_name: catalog.name_of(target.type_id()).to_string(),
                referenced_from: catalog.name_of(source.type_id()).to_string(),
            })?;
        cache.insert(
            target,
            PatchedObject {
                object,
                rid,
                dirty: false,
            },
        );
    }
    let entry = cache.get_mut(&target).expect("inserted above");

    match catalog.opposite_of(target.type_id(), forward) {
        Some(opposite) => {
            match opposite.multiplicity {
                // Repeated forward references produce repeated
                // back-references; the list is stored as streamed.
                Multiplicity::Many => entry.object.append_reference(&opposite.name, source.oid()),
                Multiplicity::Single => entry.object.set_reference(&opposite.name, source.oid()),
            }
            entry.dirty = true;
        }
        None => {
            if !catalog.is_exempt(target.type_id(), &forward.name) {
                tracing::warn!(
                    forward = %forward.name,
                    referenced_type = %catalog.name_of(target.type_id()),
                    "no opposite field for forward reference"
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use modelbase_core::schema::TypeDef;
    use modelbase_storage::MemoryKvStore;
    use std::sync::Arc;

    fn catalog() -> (TypeCatalog, TypeId, TypeId, TypeId, TypeId) {
        let mut catalog = TypeCatalog::new();
        let wall = catalog.register(TypeDef::new("model", "Wall").field(
            FieldDef::reference_with_inverse(
                "ContainedIn",
                Multiplicity::Single,
                "ContainedElements",
            ),
        ));
        let space = catalog.register(TypeDef::new("model", "Space").field(
            FieldDef::reference("ContainedElements", Multiplicity::Many),
        ));
        let door = catalog.register(TypeDef::new("model", "Door").field(
            FieldDef::reference_with_inverse("Fills", Multiplicity::Single, "FilledBy"),
        ));
        let opening = catalog.register(
            TypeDef::new("model", "Opening")
                .field(FieldDef::reference("FilledBy", Multiplicity::Single)),
        );
        (catalog, wall, space, door, opening)
    }

    fn session(catalog: TypeCatalog) -> Session {
        let store = Arc::new(MemoryKvStore::for_catalog(&catalog));
        Session::new(store, Arc::new(catalog))
    }

    fn ctx() -> QueryContext {
        QueryContext {
            pid: 1,
            rid: 1,
            croid: Oid::NIL,
            roid: Oid::NIL,
        }
    }

    fn no_progress() -> impl FnMut(&str, Option<u32>) {
        |_, _| {}
    }

    fn put(session: &mut Session, object: &VirtualObject) {
        session.put_object(1, 1, object).unwrap();
    }

    #[test]
    fn test_many_opposite_appends_back_references() {
        let (catalog, wall, space, ..) = catalog();
        let mut session = session(catalog);

        let space_oid = session.new_oid(space);
        put(&mut session, &VirtualObject::new(space_oid));

        let mut wall_oids = Vec::new();
        for _ in 0..2 {
            let oid = session.new_oid(wall);
            let mut object = VirtualObject::new(oid);
            object.set_reference("ContainedIn", space_oid);
            put(&mut session, &object);
            wall_oids.push(oid);
        }

        let written = fix_inverses(&mut session, &ctx(), &[wall, space], &mut no_progress())
            .unwrap();
        assert_eq!(written, 1);

        let (patched, rid) = session.get_object(1, space_oid, 1).unwrap().unwrap();
        assert_eq!(rid, 1);
        assert_eq!(
            patched.referenced_oids("ContainedElements"),
            wall_oids.as_slice()
        );
    }

    #[test]
    fn test_single_opposite_overwrites() {
        let (catalog, _, _, door, opening) = catalog();
        let mut session = session(catalog);

        let opening_oid = session.new_oid(opening);
        put(&mut session, &VirtualObject::new(opening_oid));

        let door_oid = session.new_oid(door);
        let mut object = VirtualObject::new(door_oid);
        object.set_reference("Fills", opening_oid);
        put(&mut session, &object);

        fix_inverses(&mut session, &ctx(), &[door, opening], &mut no_progress()).unwrap();

        let (patched, _) = session.get_object(1, opening_oid, 1).unwrap().unwrap();
        assert_eq!(patched.referenced_oids("FilledBy"), &[door_oid]);
    }

    #[test]
    fn test_duplicate_forward_references_are_not_deduplicated() {
        let (mut catalog_base, _, _, _, _) = catalog();
        // A multi-valued forward reference to exercise repeated targets.
        let rel = catalog_base.register(TypeDef::new("model", "RelContained").field(
            FieldDef::reference_with_inverse(
                "RelatedElements",
                Multiplicity::Many,
                "ContainedElements",
            ),
        ));
        let space = catalog_base.id_of("Space").unwrap();
        let mut session = session(catalog_base);

        let space_oid = session.new_oid(space);
        put(&mut session, &VirtualObject::new(space_oid));

        let rel_oid = session.new_oid(rel);
        let mut object = VirtualObject::new(rel_oid);
        object.append_reference("RelatedElements", space_oid);
        object.append_reference("RelatedElements", space_oid);
        put(&mut session, &object);

        fix_inverses(&mut session, &ctx(), &[rel], &mut no_progress()).unwrap();

        let (patched, _) = session.get_object(1, space_oid, 1).unwrap().unwrap();
        assert_eq!(
            patched.referenced_oids("ContainedElements"),
            &[rel_oid, rel_oid]
        );
    }

    #[test]
    fn test_dangling_reference_names_both_types() {
        let (catalog, wall, space, ..) = catalog();
        let mut session = session(catalog);

        let missing = Oid::new(space, 999);
        let oid = session.new_oid(wall);
        let mut object = VirtualObject::new(oid);
        object.set_reference("ContainedIn", missing);
        put(&mut session, &object);

        let err = fix_inverses(&mut session, &ctx(), &[wall], &mut no_progress()).unwrap_err();
        match err {
            CheckinError::Storage(StorageError::DanglingReference {
                oid,
                type_name,
                referenced_from,
            }) => {
                assert_eq!(oid, missing);
                assert_eq!(type_name, "Space");
                assert_eq!(referenced_from, "Wall");
            }
            other => panic!("expected dangling reference, got {other}"),
        }
    }

    #[test]
    fn test_failed_fixup_persists_no_patches() {
        let (catalog, wall, space, ..) = catalog();
        let mut session = session(catalog);

        let space_oid = session.new_oid(space);
        put(&mut session, &VirtualObject::new(space_oid));

        // First wall patches the space in the cache; the second dangles, so
        // the pass fails before any write-back happens.
        let first = session.new_oid(wall);
        let mut object = VirtualObject::new(first);
        object.set_reference("ContainedIn", space_oid);
        put(&mut session, &object);

        let second = session.new_oid(wall);
        let mut object = VirtualObject::new(second);
        object.set_reference("ContainedIn", Oid::new(space, 999));
        put(&mut session, &object);

        fix_inverses(&mut session, &ctx(), &[wall, space], &mut no_progress()).unwrap_err();

        let (untouched, _) = session.get_object(1, space_oid, 1).unwrap().unwrap();
        assert!(untouched.referenced_oids("ContainedElements").is_empty());
    }

    #[test]
    fn test_missing_opposite_is_skipped() {
        let mut catalog = TypeCatalog::new();
        let wall = catalog.register(TypeDef::new("model", "Wall").field(
            FieldDef::reference_with_inverse(
                "ContainedIn",
                Multiplicity::Single,
                "ContainedElements",
            ),
        ));
        // Slab declares no ContainedElements field.
        let slab = catalog.register(TypeDef::new("model", "Slab"));
        catalog.exempt_missing_opposite(slab, "ContainedIn");
        let mut session = session(catalog);

        let slab_oid = session.new_oid(slab);
        put(&mut session, &VirtualObject::new(slab_oid));

        let oid = session.new_oid(wall);
        let mut object = VirtualObject::new(oid);
        object.set_reference("ContainedIn", slab_oid);
        put(&mut session, &object);

        let written =
            fix_inverses(&mut session, &ctx(), &[wall, slab], &mut no_progress()).unwrap();
        assert_eq!(written, 0);

        let (untouched, _) = session.get_object(1, slab_oid, 1).unwrap().unwrap();
        assert!(untouched.referenced_oids("ContainedElements").is_empty());
    }

    #[test]
    fn test_only_objects_of_the_revision_are_scanned() {
        let (catalog, wall, space, ..) = catalog();
        let mut session = session(catalog);

        let space_oid = session.new_oid(space);
        session.put_object(1, 2, &VirtualObject::new(space_oid)).unwrap();

        // A wall from an earlier revision referencing the same space.
        let old_oid = session.new_oid(wall);
        let mut old = VirtualObject::new(old_oid);
        old.set_reference("ContainedIn", space_oid);
        session.put_object(1, 1, &old).unwrap();

        let ctx = QueryContext {
            pid: 1,
            rid: 2,
            croid: Oid::NIL,
            roid: Oid::NIL,
        };
        let written =
            fix_inverses(&mut session, &ctx, &[wall, space], &mut no_progress()).unwrap();
        assert_eq!(written, 0);
    }
}
