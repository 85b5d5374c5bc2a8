// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The checkin report attached to every committed revision.
//!
//! Stored twice, as `text/html` for humans and `application/json` for
//! tooling, each as an [`modelbase_core::model::ExtendedData`] attachment.

use serde::Serialize;

use modelbase_core::error::StorageError;

/// What the checkin ingested, in attachment form.
#[derive(Debug, Clone, Serialize)]
pub struct CheckinReport {
    pub file_name: String,
    /// Bytes consumed from the upload stream.
    pub file_size: u64,
    /// Objects the deserializer wrote.
    pub object_count: u64,
    /// Name of the deserializer that handled the format.
    pub deserializer: String,
}

impl CheckinReport {
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self).map_err(|e| StorageError::Codec(e.to_string()))
    }

    pub fn to_html(&self) -> String {
        format!(
            "<html><head><title>Checkin report</title></head><body><table>\
             <tr><td>File</td><td>{}</td></tr>\
             <tr><td>File size</td><td>{}</td></tr>\
             <tr><td>Objects</td><td>{}</td></tr>\
             <tr><td>Deserializer</td><td>{}</td></tr>\
             </table></body></html>",
            self.file_name, self.file_size, self.object_count, self.deserializer
        )
    }
}
