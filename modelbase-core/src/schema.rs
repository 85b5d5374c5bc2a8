// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! # Type Catalog
//!
//! Registry-driven schema description consumed by the ingestion pipeline:
//! a mapping from type name to an ordered list of field descriptors, plus
//! per-type storage discipline (per-record versioned vs. counter versioned).
//!
//! The catalog is built explicitly at startup and treated as immutable for
//! the lifetime of the process. There is no runtime reflection: the inverse
//! resolver and the OID-counter codec both consult this table.
//!
//! ## Catalog order
//!
//! `TypeId` is the registration index. Everything that serializes per-type
//! data positionally (the OID-counter array in particular) iterates types
//! in ascending `TypeId`, so registration order is a persisted contract.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known type name for geometry-info records. Start OIDs for this type
/// occupy the first of the two trailing counter slots when present.
pub const GEOMETRY_INFO: &str = "GeometryInfo";

/// Well-known type name for geometry-data records (second trailing slot).
pub const GEOMETRY_DATA: &str = "GeometryData";

// =============================================================================
// Type Identity
// =============================================================================

/// Index of a type in the catalog's registration order.
///
/// The low 16 bits of every [`crate::object::Oid`] carry the `TypeId` of the
/// object, so an id must fit in a `u16`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeId(u16);

impl TypeId {
    /// Build a `TypeId` from a raw catalog index.
    pub fn from_index(index: u16) -> Self {
        TypeId(index)
    }

    /// The raw catalog index.
    pub fn index(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

// =============================================================================
// Field / Type Descriptors
// =============================================================================

/// Whether a field holds one value or an ordered list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplicity {
    Single,
    Many,
}

/// One field of a catalog type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, unique within the owning type.
    pub name: String,

    /// Single- or multi-valued.
    pub multiplicity: Multiplicity,

    /// True if the field holds object references rather than plain values.
    pub reference: bool,

    /// For a forward reference that participates in a bidirectional
    /// relationship: the name of the opposite field on the referenced type.
    /// The inverse resolver derives back-references from these.
    pub inverse: Option<String>,
}

impl FieldDef {
    /// A plain (non-reference) field.
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multiplicity: Multiplicity::Single,
            reference: false,
            inverse: None,
        }
    }

    /// A reference field with no inverse.
    pub fn reference(name: impl Into<String>, multiplicity: Multiplicity) -> Self {
        Self {
            name: name.into(),
            multiplicity,
            reference: true,
            inverse: None,
        }
    }

    /// A forward reference whose opposite field on the target type is
    /// `inverse`. These are the fields the inverse resolver walks.
    pub fn reference_with_inverse(
        name: impl Into<String>,
        multiplicity: Multiplicity,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            multiplicity,
            reference: true,
            inverse: Some(inverse.into()),
        }
    }

    /// True if this is a forward reference participating in a bidirectional
    /// relationship.
    pub fn has_inverse(&self) -> bool {
        self.reference && self.inverse.is_some()
    }
}

/// One type in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Package this type belongs to. Used for table naming only.
    pub package: String,

    /// Type name, unique within the catalog.
    pub name: String,

    /// Storage discipline: `true` means each write creates a new
    /// revision-tagged key and the engine's transaction handles history and
    /// rollback; `false` means the type is counter versioned and must be
    /// manually rolled back on abort.
    pub per_record_versioning: bool,

    /// Ordered field descriptors.
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            per_record_versioning: false,
            fields: Vec::new(),
        }
    }

    /// Mark this type as per-record versioned (engine-managed rollback).
    pub fn per_record_versioned(mut self) -> Self {
        self.per_record_versioning = true;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Storage table for this type.
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.package, self.name)
    }

    /// Look up a field by name.
    pub fn field_named(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The fixed type catalog consumed read-only by the ingestion pipeline.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeId>,
    /// `(referenced type, forward field name)` pairs for which a missing
    /// opposite field is tolerated silently. Schema-declared exemptions,
    /// never hardcoded in the resolver.
    missing_opposite_exemptions: HashSet<(TypeId, String)>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, returning its id. Panics on duplicate names since
    /// the catalog is constructed once at startup from a fixed schema.
    pub fn register(&mut self, def: TypeDef) -> TypeId {
        assert!(
            !self.by_name.contains_key(&def.name),
            "duplicate type registration: {}",
            def.name
        );
        assert!(self.types.len() < u16::MAX as usize, "catalog overflow");
        let id = TypeId(self.types.len() as u16);
        self.by_name.insert(def.name.clone(), id);
        self.types.push(def);
        id
    }

    /// Declare that `forward_field`, when it points at an instance of
    /// `referenced`, may legitimately find no opposite field there.
    pub fn exempt_missing_opposite(&mut self, referenced: TypeId, forward_field: impl Into<String>) {
        self.missing_opposite_exemptions
            .insert((referenced, forward_field.into()));
    }

    pub fn is_exempt(&self, referenced: TypeId, forward_field: &str) -> bool {
        self.missing_opposite_exemptions
            .contains(&(referenced, forward_field.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Descriptor for a type. Panics on an id not issued by this catalog;
    /// ids and catalog are created together and never mixed.
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0 as usize]
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        &self.type_def(id).name
    }

    pub fn table_name(&self, id: TypeId) -> String {
        self.type_def(id).table_name()
    }

    pub fn per_record_versioning(&self, id: TypeId) -> bool {
        self.type_def(id).per_record_versioning
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate all types in catalog (registration) order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, def)| (TypeId(i as u16), def))
    }

    /// True if the type declares at least one forward reference with an
    /// inverse. Types without inverses are skipped by the resolver.
    pub fn has_inverses(&self, id: TypeId) -> bool {
        self.type_def(id).fields.iter().any(FieldDef::has_inverse)
    }

    /// The forward-reference fields of `id` that carry an inverse.
    pub fn inverse_fields(&self, id: TypeId) -> impl Iterator<Item = &FieldDef> {
        self.type_def(id).fields.iter().filter(|f| f.has_inverse())
    }

    /// The opposite field that a forward reference `forward` (declared on
    /// some other type) maps to on the referenced type `referenced`.
    /// `None` when the referenced type does not declare the opposite.
    pub fn opposite_of(&self, referenced: TypeId, forward: &FieldDef) -> Option<&FieldDef> {
        let opposite_name = forward.inverse.as_deref()?;
        self.type_def(referenced).field_named(opposite_name)
    }

    /// Id of the well-known geometry-info type, if registered.
    pub fn geometry_info(&self) -> Option<TypeId> {
        self.id_of(GEOMETRY_INFO)
    }

    /// Id of the well-known geometry-data type, if registered.
    pub fn geometry_data(&self) -> Option<TypeId> {
        self.id_of(GEOMETRY_DATA)
    }
}

// =============================================================================
// Tests
// =============================================================================
