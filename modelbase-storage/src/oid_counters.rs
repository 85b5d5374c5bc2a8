// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Per-type start-OID snapshots and their persisted binary layout.
//!
//! A [`OidCounters`] value records, for every counter-versioned type the
//! checkin touched, the first oid that belongs to the new concrete
//! revision. It is the basis for both the inverse-fixup object scan and
//! the rollback range scans.
//!
//! ## Binary layout
//!
//! Fixed-width little-endian 8-byte integers, one per counter-versioned
//! type observed in the stream, in catalog iteration order. Two trailing
//! slots carry the geometry-info and geometry-data start oids, appended
//! only by the post-fixup finalization pass and only when the stream
//! produced both geometry record kinds. The type list itself is not part
//! of the layout; decoders reconstruct it from the revision's summary and
//! the catalog order.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use modelbase_core::error::StorageError;
use modelbase_core::object::Oid;
use modelbase_core::schema::{TypeCatalog, TypeId};

/// Snapshot of per-type start oids, ordered by catalog iteration order
/// (geometry slots last, when present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidCounters {
    entries: Vec<(TypeId, Oid)>,
}

impl OidCounters {
    /// Build the snapshot for a checkin.
    ///
    /// `summary_types` are the types the deserializer reported;
    /// `start_oids` the session's observed per-type allocation frontier.
    /// Only counter-versioned summary types are included, in catalog
    /// order. With `include_geometry`, the two geometry slots are appended
    /// when both geometry types allocated oids during this checkin.
    ///
    /// Fails with [`StorageError::NoChanges`] when nothing was allocated:
    /// committing a revision with no counter snapshot would leave counter
    /// state inconsistent.
    pub fn snapshot(
        catalog: &TypeCatalog,
        summary_types: &[TypeId],
        start_oids: &HashMap<TypeId, Oid>,
        include_geometry: bool,
    ) -> Result<Self, StorageError> {
        if start_oids.is_empty() {
            return Err(StorageError::NoChanges);
        }

        let mut ordered: Vec<TypeId> = summary_types
            .iter()
            .copied()
            .filter(|t| !catalog.per_record_versioning(*t))
            .collect();
        ordered.sort();
        ordered.dedup();

        let mut entries = Vec::with_capacity(ordered.len() + 2);
        for type_id in ordered {
            let start = start_oids.get(&type_id).copied().ok_or_else(|| {
                StorageError::Engine(format!(
                    "no start oid recorded for {}",
                    catalog.name_of(type_id)
                ))
            })?;
            entries.push((type_id, start));
        }

        if include_geometry {
            if let (Some(info), Some(data)) = (catalog.geometry_info(), catalog.geometry_data()) {
                if let (Some(info_start), Some(data_start)) =
                    (start_oids.get(&info), start_oids.get(&data))
                {
                    entries.push((info, *info_start));
                    entries.push((data, *data_start));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Encode as the persisted little-endian u64 array.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 * self.entries.len());
        for (_, oid) in &self.entries {
            buf.extend_from_slice(&oid.as_u64().to_le_bytes());
        }
        buf
    }

    /// Decode a persisted array given the same ordered type list that was
    /// used to encode it.
    pub fn from_bytes(types: &[TypeId], bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != 8 * types.len() {
            return Err(StorageError::Codec(format!(
                "oid counter array: expected {} bytes for {} types, got {}",
                8 * types.len(),
                types.len(),
                bytes.len()
            )));
        }
        let entries = types
            .iter()
            .zip(bytes.chunks_exact(8))
            .map(|(type_id, chunk)| {
                let raw = u64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes"));
                (*type_id, Oid::from_u64(raw))
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, type_id: TypeId) -> Option<Oid> {
        self.entries
            .iter()
            .find(|(t, _)| *t == type_id)
            .map(|(_, oid)| *oid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, Oid)> + '_ {
        self.entries.iter().copied()
    }

    pub fn types(&self) -> Vec<TypeId> {
        self.entries.iter().map(|(t, _)| *t).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Decode cache
// =============================================================================

/// Cache of decoded counter arrays keyed by ConcreteRevision oid.
///
/// The coordinator re-snapshots counters after geometry generation, so any
/// entry decoded from the pre-fixup array must be invalidated before
/// commit or readers would see an incomplete snapshot.
#[derive(Debug, Default)]
pub struct OidCountersCache {
    inner: DashMap<Oid, Arc<OidCounters>>,
}

impl OidCountersCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode-through read.
    pub fn get_or_decode(
        &self,
        concrete_revision: Oid,
        types: &[TypeId],
        bytes: &[u8],
    ) -> Result<Arc<OidCounters>, StorageError> {
        if let Some(cached) = self.inner.get(&concrete_revision) {
            return Ok(cached.clone());
        }
        let decoded = Arc::new(OidCounters::from_bytes(types, bytes)?);
        self.inner.insert(concrete_revision, decoded.clone());
        Ok(decoded)
    }

    pub fn invalidate(&self, concrete_revision: Oid) {
        self.inner.remove(&concrete_revision);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
