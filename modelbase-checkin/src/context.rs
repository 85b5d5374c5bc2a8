// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The revision context a checkin hands to its collaborators.

use modelbase_core::object::Oid;

/// Identifies the revision a checkin writes into. Created before streaming
/// begins so the deserializer and the geometry generator have a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryContext {
    /// Project id, as embedded in record keys.
    pub pid: u32,
    /// Revision id within the project.
    pub rid: u32,
    /// The ConcreteRevision entity being built.
    pub croid: Oid,
    /// The primary logical Revision.
    pub roid: Oid,
}
