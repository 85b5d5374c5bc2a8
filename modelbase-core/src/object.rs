// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Object identity and the generic typed record written by the streaming
//! deserializer.
//!
//! An [`Oid`] is unique within a project and partitioned by type: the low
//! 16 bits carry the catalog [`TypeId`], the upper 48 bits a per-type
//! sequence that only grows. Packing the type into the id lets diagnostics
//! (dangling references in particular) name the type of a bare oid without
//! a lookup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::TypeId;

// =============================================================================
// Oid
// =============================================================================

/// Object identifier: `(sequence << 16) | type index`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Oid(u64);

impl Oid {
    /// The nil oid. Never issued by a counter.
    pub const NIL: Oid = Oid(0);

    /// Compose an oid from a type and a per-type sequence number.
    pub fn new(type_id: TypeId, sequence: u64) -> Self {
        debug_assert!(sequence <= u64::MAX >> 16);
        Oid((sequence << 16) | type_id.index() as u64)
    }

    /// The type that owns this oid.
    pub fn type_id(&self) -> TypeId {
        TypeId::from_index((self.0 & 0xFFFF) as u16)
    }

    /// The per-type sequence number.
    pub fn sequence(&self) -> u64 {
        self.0 >> 16
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Oid(raw)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Oid {
    fn default() -> Self {
        Oid::NIL
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Field values / virtual objects
// =============================================================================

/// A single field value of a streamed record. References are stored as bare
/// oids; the forward-only streaming write never materializes the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Ref(Oid),
    RefList(Vec<Oid>),
}

/// A schema-typed record, keyed by field name.
///
/// The deserializer writes these directly to the store; the inverse
/// resolver reads them back, patches opposite references and overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualObject {
    oid: Oid,
    fields: BTreeMap<String, FieldValue>,
}

impl VirtualObject {
    pub fn new(oid: Oid) -> Self {
        Self {
            oid,
            fields: BTreeMap::new(),
        }
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn type_id(&self) -> TypeId {
        self.oid.type_id()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style `set` for test and deserializer construction.
    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    /// Overwrite a single-valued reference field.
    pub fn set_reference(&mut self, field: impl Into<String>, target: Oid) {
        self.fields.insert(field.into(), FieldValue::Ref(target));
    }

    /// Append to a multi-valued reference field (read-modify-append).
    ///
    /// Deliberately does not deduplicate: repeated forward references to the
    /// same target produce repeated back-references, matching the stored
    /// semantics of the forward pass.
    pub fn append_reference(&mut self, field: impl Into<String>, target: Oid) {
        let entry = self
            .fields
            .entry(field.into())
            .or_insert_with(|| FieldValue::RefList(Vec::new()));
        match entry {
            FieldValue::RefList(list) => list.push(target),
            // A single-valued slot being appended to becomes a list.
            other => {
                let existing = match other {
                    FieldValue::Ref(oid) => vec![*oid, target],
                    _ => vec![target],
                };
                *other = FieldValue::RefList(existing);
            }
        }
    }

    /// All oids referenced by `field`, whether single- or multi-valued.
    pub fn referenced_oids(&self, field: &str) -> &[Oid] {
        match self.fields.get(field) {
            Some(FieldValue::Ref(oid)) => std::slice::from_ref(oid),
            Some(FieldValue::RefList(list)) => list.as_slice(),
            _ => &[],
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// Tests
// =============================================================================
