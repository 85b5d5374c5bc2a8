// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Error taxonomy for the checkin pipeline.
//!
//! Two classes, caught exactly once at the top of a checkin:
//!
//! - [`UserError`] — caller-facing, non-retryable as-is, reported without
//!   storage side effects.
//! - [`StorageError`] — engine or consistency faults; always abort the
//!   checkin. `NoChanges` and `DanglingReference` live here because both
//!   indicate an inconsistent stored state rather than caller misuse.

use crate::object::Oid;

/// Caller-facing failure. Reported directly, never wrapped further.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("project {0} not found")]
    InvalidProject(Oid),

    #[error("user {0} not found")]
    InvalidUser(Oid),

    #[error("user has no rights to check in models to this project")]
    NoCheckinRights,

    #[error("users must have a valid e-mail address to check in")]
    InvalidEmailAddress,

    #[error("a checkin is already in progress for this project")]
    CheckinInProgress,

    #[error("invalid comment: {0}")]
    InvalidComment(String),

    /// Unexpected fault surfaced to the caller with its original cause.
    #[error("checkin failed: {0}")]
    Internal(String),
}

/// Storage or consistency fault. Always aborts the checkin.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The stream produced zero persisted objects, so no per-type counters
    /// were observed. Counter state would be inconsistent if committed.
    #[error("no objects changed")]
    NoChanges,

    /// The inverse-fixup pass found a forward reference to an object that
    /// does not exist in the store.
    #[error("referenced object {oid} ({type_name}), referenced from {referenced_from}, not found")]
    DanglingReference {
        oid: Oid,
        type_name: String,
        referenced_from: String,
    },

    #[error("lock conflict on table {0}")]
    LockConflict(String),

    #[error("unknown table {0}")]
    UnknownTable(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage engine error: {0}")]
    Engine(String),
}

/// Classified checkin failure as exposed upward.
#[derive(Debug, thiserror::Error)]
pub enum CheckinError {
    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CheckinError {
    /// True for faults a caller can act on (fix input, ask for rights).
    pub fn is_user_error(&self) -> bool {
        matches!(self, CheckinError::User(_))
    }
}

/// I/O faults from the upload stream are outside both taxonomies; they
/// reach the caller wrapped with their original cause.
impl From<std::io::Error> for CheckinError {
    fn from(e: std::io::Error) -> Self {
        CheckinError::User(UserError::Internal(e.to_string()))
    }
}

pub type Result<T, E = CheckinError> = std::result::Result<T, E>;
