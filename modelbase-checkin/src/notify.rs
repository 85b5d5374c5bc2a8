// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Outbound notification boundary and the e-mail shape check used during
//! admission.

use modelbase_core::error::CheckinError;
use modelbase_core::object::Oid;

/// Event published after a checkin durably commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRevisionNotification {
    pub project: Oid,
    pub revision: Oid,
}

/// Delivers revision notifications to interested parties. Runs strictly
/// post-commit; a delivery failure is logged, never surfaced to the
/// checkin caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: NewRevisionNotification) -> Result<(), CheckinError>;
}

/// Shape check on a user's e-mail address: one `@` with a non-empty local
/// part, a dot somewhere in the domain, and no whitespace.
pub fn is_valid_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = address.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
