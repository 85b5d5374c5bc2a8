// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Persisted store entities: projects, revisions, attachments and audit
//! records.
//!
//! All entities are per-record versioned — their tables are transactional
//! in the engine, so aborting the enclosing transaction discards them
//! without manual rollback. Counter-versioned model objects
//! ([`crate::object::VirtualObject`]) are the opposite case.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::error::UserError;
use crate::object::Oid;

/// Milliseconds since the Unix epoch; the timestamp format of every entity.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A persistable store entity: a fixed table plus an oid-valued identity.
pub trait Entity: Serialize + DeserializeOwned {
    /// Catalog type name. Entity types are registered per-record versioned.
    const TYPE_NAME: &'static str;

    /// Storage table, `store_{TYPE_NAME}` by convention.
    const TABLE: &'static str;

    fn oid(&self) -> Oid;
}

// =============================================================================
// Project
// =============================================================================

/// Single-writer checkin marker on a project: {idle → checking-in → idle}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckinState {
    Idle,
    InProgress,
}

/// Top-level container. Owns concrete revisions and the single-writer lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub oid: Oid,
    /// Small dense id embedded in every record key.
    pub id: u32,
    pub name: String,
    /// Super-project, if this project federates into a larger model.
    pub parent: Option<Oid>,
    pub concrete_revisions: Vec<Oid>,
    pub revisions: Vec<Oid>,
    pub checkin_state: CheckinState,
}

impl Project {
    pub fn new(oid: Oid, id: u32, name: impl Into<String>) -> Self {
        Self {
            oid,
            id,
            name: name.into(),
            parent: None,
            concrete_revisions: Vec::new(),
            revisions: Vec::new(),
            checkin_state: CheckinState::Idle,
        }
    }

    /// Take the single-writer lock. Rejected while another checkin is in
    /// flight; must be persisted in its own short transaction so competing
    /// attempts observe it.
    pub fn begin_checkin(&mut self) -> Result<(), UserError> {
        match self.checkin_state {
            CheckinState::Idle => {
                self.checkin_state = CheckinState::InProgress;
                Ok(())
            }
            CheckinState::InProgress => Err(UserError::CheckinInProgress),
        }
    }

    /// Release the single-writer lock. Runs on both the commit and the
    /// abort path, always in a transaction independent of the checkin.
    pub fn finish_checkin(&mut self) {
        self.checkin_state = CheckinState::Idle;
    }
}

impl Entity for Project {
    const TYPE_NAME: &'static str = "Project";
    const TABLE: &'static str = "store_Project";

    fn oid(&self) -> Oid {
        self.oid
    }
}

// =============================================================================
// Revisions
// =============================================================================

/// Logical, user-visible version; may aggregate several concrete revisions
/// when sub-models federate into super-projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub oid: Oid,
    pub project: Oid,
    pub concrete_revisions: Vec<Oid>,
    pub comment: String,
    pub user: Oid,
    pub date: u64,
    /// Total object count across all aggregated concrete revisions.
    pub size: u64,
    pub has_geometry: bool,
    pub bounds: Bounds,
    pub bounds_untransformed: Bounds,
    pub bounds_mm: Bounds,
    pub bounds_untransformed_mm: Bounds,
    pub densities: DensityCollection,
    pub nr_triangles: u64,
    /// Service that created this revision, when checked in by an external
    /// service actor.
    pub service: Option<Oid>,
    pub services_linked: Vec<Oid>,
    pub extended_data: Vec<Oid>,
}

impl Revision {
    pub fn new(oid: Oid, project: Oid, user: Oid, comment: impl Into<String>) -> Self {
        Self {
            oid,
            project,
            concrete_revisions: Vec::new(),
            comment: comment.into(),
            user,
            date: now_millis(),
            size: 0,
            has_geometry: false,
            bounds: Bounds::EMPTY,
            bounds_untransformed: Bounds::EMPTY,
            bounds_mm: Bounds::EMPTY,
            bounds_untransformed_mm: Bounds::EMPTY,
            densities: DensityCollection::default(),
            nr_triangles: 0,
            service: None,
            services_linked: Vec::new(),
            extended_data: Vec::new(),
        }
    }
}

impl Entity for Revision {
    const TYPE_NAME: &'static str = "Revision";
    const TABLE: &'static str = "store_Revision";

    fn oid(&self) -> Oid {
        self.oid
    }
}

/// One physically ingested sub-model snapshot. Mutated throughout a checkin,
/// immutable once the enclosing transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcreteRevision {
    pub oid: Oid,
    /// Revision id within the project; embedded (negated) in record keys.
    pub rid: u32,
    pub project: Oid,
    pub revisions: Vec<Oid>,
    /// Object count reported by the deserializer.
    pub size: u64,
    /// Serialized per-type start-OID snapshot (little-endian u64 array in
    /// catalog order, two trailing geometry slots when present).
    pub oid_counters: Vec<u8>,
    pub multiplier_to_mm: f32,
    pub bounds: Bounds,
    pub bounds_untransformed: Bounds,
    pub densities: DensityCollection,
    pub header: Option<Oid>,
    /// Superseded data, kept for historical revisions but eligible for
    /// later physical deletion.
    pub clear: bool,
    /// Per-type object counts, keyed by type name.
    pub summary: BTreeMap<String, u64>,
}

impl ConcreteRevision {
    pub fn new(oid: Oid, rid: u32, project: Oid) -> Self {
        Self {
            oid,
            rid,
            project,
            revisions: Vec::new(),
            size: 0,
            oid_counters: Vec::new(),
            multiplier_to_mm: 1.0,
            bounds: Bounds::EMPTY,
            bounds_untransformed: Bounds::EMPTY,
            densities: DensityCollection::default(),
            header: None,
            clear: false,
            summary: BTreeMap::new(),
        }
    }
}

impl Entity for ConcreteRevision {
    const TYPE_NAME: &'static str = "ConcreteRevision";
    const TABLE: &'static str = "store_ConcreteRevision";

    fn oid(&self) -> Oid {
        self.oid
    }
}

// =============================================================================
// Densities
// =============================================================================

/// Per-type-class histogram entry used for level-of-detail streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Density {
    pub type_name: String,
    pub density: f32,
    pub triangles_below: u64,
    pub volume: f32,
    pub geometry_info_oid: Oid,
}

/// Density entries, kept sorted ascending by density value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityCollection {
    densities: Vec<Density>,
}

impl DensityCollection {
    /// Build a collection from arbitrary-order entries; sorts ascending.
    pub fn from_entries(mut entries: Vec<Density>) -> Self {
        entries.sort_by(|a, b| a.density.total_cmp(&b.density));
        Self { densities: entries }
    }

    /// Concatenate several collections into one re-sorted collection and
    /// return it together with the summed triangles-below total.
    pub fn aggregate<'a>(parts: impl Iterator<Item = &'a DensityCollection>) -> (Self, u64) {
        let mut entries = Vec::new();
        let mut nr_triangles = 0u64;
        for part in parts {
            for density in &part.densities {
                nr_triangles += density.triangles_below;
                entries.push(density.clone());
            }
        }
        (Self::from_entries(entries), nr_triangles)
    }

    pub fn densities(&self) -> &[Density] {
        &self.densities
    }

    pub fn is_sorted(&self) -> bool {
        self.densities
            .windows(2)
            .all(|w| w[0].density <= w[1].density)
    }

    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }
}

// =============================================================================
// Audit / attachments / users
// =============================================================================

/// How a checkin reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMethod {
    Internal,
    Web,
    Rest,
    Soap,
}

/// Append-only audit record written for every committed revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRevisionAdded {
    pub oid: Oid,
    pub date: u64,
    pub executor: Oid,
    pub revision: Oid,
    pub project: Oid,
    pub access_method: AccessMethod,
}

impl Entity for NewRevisionAdded {
    const TYPE_NAME: &'static str = "NewRevisionAdded";
    const TABLE: &'static str = "store_NewRevisionAdded";

    fn oid(&self) -> Oid {
        self.oid
    }
}

/// Opaque attachment linked to a revision (generated reports and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedData {
    pub oid: Oid,
    pub title: String,
    pub added: u64,
    pub size: u64,
    pub file: Oid,
    pub user: Oid,
    pub project: Oid,
    pub revision: Oid,
}

impl Entity for ExtendedData {
    const TYPE_NAME: &'static str = "ExtendedData";
    const TABLE: &'static str = "store_ExtendedData";

    fn oid(&self) -> Oid {
        self.oid
    }
}

/// Stored file payload backing an [`ExtendedData`] attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBlob {
    pub oid: Oid,
    pub filename: String,
    pub mime: String,
    pub size: u64,
    pub data: Vec<u8>,
}

impl Entity for FileBlob {
    const TYPE_NAME: &'static str = "File";
    const TABLE: &'static str = "store_File";

    fn oid(&self) -> Oid {
        self.oid
    }
}

/// Optional header parsed from the input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelHeader {
    pub oid: Oid,
    pub description: Vec<String>,
    pub author: Vec<String>,
    pub organization: Vec<String>,
    pub originating_system: String,
    pub authorization: String,
    pub time_stamp: String,
    pub filename: String,
    pub schema_version: String,
}

impl Entity for ModelHeader {
    const TYPE_NAME: &'static str = "ModelHeader";
    const TABLE: &'static str = "store_ModelHeader";

    fn oid(&self) -> Oid {
        self.oid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub oid: Oid,
    /// E-mail address; must be well-formed to check in.
    pub username: String,
    pub name: String,
}

impl Entity for User {
    const TYPE_NAME: &'static str = "User";
    const TABLE: &'static str = "store_User";

    fn oid(&self) -> Oid {
        self.oid
    }
}

/// Register every store entity type with a catalog. Entity tables are
/// per-record versioned: the engine transaction rolls them back on abort.
pub fn register_store_types(catalog: &mut crate::schema::TypeCatalog) {
    use crate::schema::TypeDef;
    for name in [
        Project::TYPE_NAME,
        Revision::TYPE_NAME,
        ConcreteRevision::TYPE_NAME,
        NewRevisionAdded::TYPE_NAME,
        ExtendedData::TYPE_NAME,
        FileBlob::TYPE_NAME,
        ModelHeader::TYPE_NAME,
        User::TYPE_NAME,
    ] {
        catalog.register(TypeDef::new("store", name).per_record_versioned());
    }
}

// =============================================================================
// Tests
// =============================================================================
