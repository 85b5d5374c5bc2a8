// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The authorization boundary consulted during checkin admission.

use modelbase_core::error::UserError;
use modelbase_core::model::{Project, User};
use modelbase_core::object::Oid;

/// Identity and rights of the actor performing a checkin.
pub trait Authorization {
    /// The acting user.
    fn user_oid(&self) -> Oid;

    /// Coarse capability check, evaluated before anything is loaded.
    fn can_checkin(&self, project: Oid) -> Result<(), UserError>;

    /// Fine-grained check against the loaded entities: the user must hold
    /// checkin rights on the project or one of its super-projects.
    fn has_rights_on_project_or_super_projects(&self, user: &User, project: &Project) -> bool;

    /// The external service acting on the user's behalf, when the checkin
    /// was triggered by one. Recorded on the new revision.
    fn linked_service(&self) -> Option<Oid> {
        None
    }
}
