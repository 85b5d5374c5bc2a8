// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The geometry generation boundary.
//!
//! After the inverse pass the coordinator hands the revision to a geometry
//! generator, which triangulates the model, writes geometry-info and
//! geometry-data records through the session, and reports the aggregates
//! the revision bookkeeping needs.

use modelbase_core::bounds::Bounds;
use modelbase_core::error::CheckinError;
use modelbase_core::object::Oid;
use modelbase_storage::Session;

use crate::context::QueryContext;

/// One density histogram entry produced by geometry generation.
#[derive(Debug, Clone)]
pub struct GeneratedDensity {
    pub type_name: String,
    pub density: f32,
    pub triangles: u64,
    pub volume: f32,
    pub geometry_info_oid: Oid,
}

/// Aggregates returned by a completed geometry run.
#[derive(Debug, Clone)]
pub struct GeneratedGeometry {
    /// Model bounds in the model's native length unit.
    pub bounds: Bounds,
    /// Bounds before placement transforms were applied.
    pub bounds_untransformed: Bounds,
    /// Conversion factor from the native unit to millimeters.
    pub multiplier_to_mm: f32,
    pub densities: Vec<GeneratedDensity>,
}

/// Produces geometry for the revision identified by `ctx`.
///
/// Implementations write their geometry records through `session` (the
/// well-known GeometryInfo/GeometryData types, counter versioned like all
/// model objects) and report progress in percent via `on_progress`.
pub trait GeometryGenerator {
    fn generate(
        &mut self,
        executor: Oid,
        session: &mut Session,
        ctx: &QueryContext,
        on_progress: &mut dyn FnMut(u32),
    ) -> Result<GeneratedGeometry, CheckinError>;
}
