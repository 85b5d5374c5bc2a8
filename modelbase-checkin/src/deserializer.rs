// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The streaming deserializer boundary.
//!
//! A deserializer parses a model file format and writes the resulting
//! typed records directly into the session as it goes. Objects are never
//! accumulated in memory: forward references are stored as bare oids and
//! resolved later by the inverse pass.

use std::collections::BTreeMap;
use std::io::Read;

use modelbase_core::error::CheckinError;
use modelbase_core::model::ModelHeader;
use modelbase_core::schema::TypeId;
use modelbase_storage::Session;

use crate::context::QueryContext;

/// Parses one input stream into counter-versioned object records.
///
/// `read` consumes the input once, writing each parsed object with
/// [`Session::put_object`] under the revision in `ctx`, and returns the
/// number of objects written. `on_bytes` is called with the cumulative
/// byte count as the stream advances, for progress reporting against the
/// declared upload size.
pub trait StreamingDeserializer {
    fn read(
        &mut self,
        input: &mut dyn Read,
        file_name: &str,
        session: &mut Session,
        ctx: &QueryContext,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<u64, CheckinError>;

    /// Per-type object counts observed during [`read`](Self::read). Forms
    /// the revision summary and selects the types the inverse pass and the
    /// counter snapshot consider.
    fn type_counts(&self) -> &BTreeMap<TypeId, u64>;

    /// Header block parsed from the input, if the format carries one.
    fn header(&self) -> Option<ModelHeader>;
}
