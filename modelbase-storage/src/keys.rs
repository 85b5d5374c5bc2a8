// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Record key layout for object tables:
//!
//! ```text
//! [4-byte project id][8-byte object id][4-byte negated revision id]
//! ```
//!
//! All fields big-endian, so lexicographic key order sorts by project, then
//! object id, then revision — newest revision first, because the revision
//! id is stored negated. MVCC reads take the first entry at or below the
//! reader's revision; rollback range-scans from `(pid, start oid)` and
//! filters on the decoded revision.

use modelbase_core::error::StorageError;
use modelbase_core::object::Oid;

/// Total encoded key length.
pub const RECORD_KEY_LEN: usize = 16;

/// Decoded object record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordKey {
    pub pid: u32,
    pub oid: Oid,
    pub rid: u32,
}

impl RecordKey {
    pub fn new(pid: u32, oid: Oid, rid: u32) -> Self {
        Self { pid, oid, rid }
    }

    pub fn encode(&self) -> [u8; RECORD_KEY_LEN] {
        let mut buf = [0u8; RECORD_KEY_LEN];
        buf[0..4].copy_from_slice(&self.pid.to_be_bytes());
        buf[4..12].copy_from_slice(&self.oid.as_u64().to_be_bytes());
        let negated = (self.rid as i32).wrapping_neg();
        buf[12..16].copy_from_slice(&negated.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != RECORD_KEY_LEN {
            return Err(StorageError::Codec(format!(
                "record key must be {} bytes, got {}",
                RECORD_KEY_LEN,
                bytes.len()
            )));
        }
        let pid = u32::from_be_bytes(bytes[0..4].try_into().expect("length checked"));
        let oid = u64::from_be_bytes(bytes[4..12].try_into().expect("length checked"));
        let negated = i32::from_be_bytes(bytes[12..16].try_into().expect("length checked"));
        Ok(Self {
            pid,
            oid: Oid::from_u64(oid),
            rid: negated.wrapping_neg() as u32,
        })
    }

    /// Prefix matching every record of one project.
    pub fn project_prefix(pid: u32) -> [u8; 4] {
        pid.to_be_bytes()
    }

    /// Scan start position: the first possible key for `(pid, oid)`.
    pub fn oid_start(pid: u32, oid: Oid) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&pid.to_be_bytes());
        buf[4..12].copy_from_slice(&oid.as_u64().to_be_bytes());
        buf
    }
}

// =============================================================================
// Tests
// =============================================================================
