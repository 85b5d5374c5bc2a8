// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! The checkin coordinator: admission, streaming ingest, inverse fixup,
//! geometry, bookkeeping, commit — and the abort path that unwinds all of
//! it.
//!
//! One checkin is one [`Session`]. Admission (rights, e-mail shape,
//! comment, the single-writer project lock) runs first, the lock persisted
//! with a guarded swap against the state the checks ran on, so competing
//! checkins observe it and racing admissions cannot both win. From
//! there every step writes through the checkin session; on any failure the
//! session aborts, write-through records are swept by the rollback engine,
//! and the project lock is released in an independent transaction. Side
//! effects (notification, lock release) are post-commit actions and never
//! run on the abort path.

use std::io::Read;
use std::sync::Arc;

use modelbase_core::bounds::Bounds;
use modelbase_core::error::{CheckinError, StorageError, UserError};
use modelbase_core::model::{
    now_millis, AccessMethod, ConcreteRevision, Density, DensityCollection, ExtendedData,
    FileBlob, ModelHeader, NewRevisionAdded, Project, Revision, User,
};
use modelbase_core::object::Oid;
use modelbase_core::schema::{TypeCatalog, TypeId};
use modelbase_storage::{rollback, KvStore, OidCounters, OidCountersCache, Session};

use crate::auth::Authorization;
use crate::context::QueryContext;
use crate::deserializer::StreamingDeserializer;
use crate::geometry::GeometryGenerator;
use crate::inverses::fix_inverses;
use crate::notify::{is_valid_email, NewRevisionNotification, Notifier};
use crate::report::CheckinReport;

/// Longest accepted checkin comment, in characters.
const MAX_COMMENT_LEN: usize = 1024;

/// Everything one checkin call carries.
pub struct CheckinRequest<'a> {
    pub project: Oid,
    pub comment: String,
    pub file_name: String,
    /// Upload size as declared by the transport, for percentage progress.
    pub declared_size: Option<u64>,
    pub input: &'a mut dyn Read,
    /// Service to link on the new revision, if one requested the checkin.
    pub new_service: Option<Oid>,
    pub access_method: AccessMethod,
    /// Name of the deserializer handling the format, recorded in the report.
    pub deserializer_name: String,
}

/// What a committed checkin produced.
#[derive(Debug, Clone, Copy)]
pub struct CheckinOutcome {
    pub concrete_revision: Oid,
    /// The primary new revision on the checked-in project itself.
    pub revision: Oid,
    pub rid: u32,
    /// Objects ingested from the stream.
    pub size: u64,
    pub bounds: Bounds,
}

/// Orchestrates checkins against one store/catalog pair.
pub struct CheckinCoordinator {
    store: Arc<dyn KvStore>,
    catalog: Arc<TypeCatalog>,
    counters_cache: Arc<OidCountersCache>,
    notifier: Arc<dyn Notifier>,
}

impl CheckinCoordinator {
    pub fn new(
        store: Arc<dyn KvStore>,
        catalog: Arc<TypeCatalog>,
        counters_cache: Arc<OidCountersCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            catalog,
            counters_cache,
            notifier,
        }
    }

    fn session(&self) -> Session {
        Session::new(self.store.clone(), self.catalog.clone())
    }

    /// Run one checkin end to end. On success the new revision is durably
    /// committed and its notification dispatched; on failure all traces of
    /// the attempt are removed and the project lock released before the
    /// error is returned.
    pub fn checkin(
        &self,
        auth: &dyn Authorization,
        deserializer: &mut dyn StreamingDeserializer,
        geometry: &mut dyn GeometryGenerator,
        request: CheckinRequest<'_>,
        progress: &mut dyn FnMut(&str, Option<u32>),
    ) -> Result<CheckinOutcome, CheckinError> {
        tracing::info!(project = %request.project, file = %request.file_name, "checkin started");
        let (mut project, user) = self.admit(auth, &request)?;
        let pid = project.id;
        let poid = project.oid;

        let mut session = self.session();
        let mut rid = 0u32;
        let result = self.run(
            &mut session,
            &mut project,
            &user,
            auth,
            deserializer,
            geometry,
            request,
            &mut rid,
            progress,
        );
        match result {
            Ok(outcome) => match session.commit() {
                Ok(()) => {
                    tracing::info!(
                        project = %poid,
                        revision = %outcome.revision,
                        size = outcome.size,
                        "checkin committed"
                    );
                    Ok(outcome)
                }
                Err(e) => Err(self.abort(&mut session, poid, pid, rid, e.into())),
            },
            Err(e) => Err(self.abort(&mut session, poid, pid, rid, e)),
        }
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Validate the caller and take the project's single-writer lock. The
    /// lock is persisted with a guarded swap against the project state the
    /// checks ran on, so two racing admissions can never both observe an
    /// idle project and both win.
    fn admit(
        &self,
        auth: &dyn Authorization,
        request: &CheckinRequest<'_>,
    ) -> Result<(Project, User), CheckinError> {
        validate_comment(&request.comment)?;
        auth.can_checkin(request.project)?;

        let session = self.session();
        let project: Project = session
            .fetch_entity(request.project)?
            .ok_or(UserError::InvalidProject(request.project))?;
        let user: User = session
            .fetch_entity(auth.user_oid())?
            .ok_or(UserError::InvalidUser(auth.user_oid()))?;

        if !auth.has_rights_on_project_or_super_projects(&user, &project) {
            return Err(UserError::NoCheckinRights.into());
        }
        if !is_valid_email(&user.username) {
            return Err(UserError::InvalidEmailAddress.into());
        }

        let mut locked = project.clone();
        locked.begin_checkin()?;
        match session.swap_entity(&project, &locked) {
            Ok(()) => Ok((locked, user)),
            Err(StorageError::LockConflict(_)) => Err(UserError::CheckinInProgress.into()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // The checkin body
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        session: &mut Session,
        project: &mut Project,
        user: &User,
        auth: &dyn Authorization,
        deserializer: &mut dyn StreamingDeserializer,
        geometry: &mut dyn GeometryGenerator,
        mut request: CheckinRequest<'_>,
        rid_out: &mut u32,
        progress: &mut dyn FnMut(&str, Option<u32>),
    ) -> Result<CheckinOutcome, CheckinError> {
        let (mut concrete, mut revisions) =
            self.create_revisions(session, project, user, request.comment.trim())?;
        *rid_out = concrete.rid;
        let ctx = QueryContext {
            pid: project.id,
            rid: concrete.rid,
            croid: concrete.oid,
            roid: revisions[0].oid,
        };

        // Stream the file straight into counter-versioned tables.
        let declared = request.declared_size;
        let mut bytes_read = 0u64;
        let size = {
            let mut on_bytes = |bytes: u64| {
                bytes_read = bytes;
                match declared {
                    Some(total) if total > 0 => {
                        let pct = (bytes.saturating_mul(100) / total).min(100) as u32;
                        progress("Deserializing model file", Some(pct));
                    }
                    _ => progress("Deserializing model file", None),
                }
            };
            deserializer.read(
                &mut *request.input,
                &request.file_name,
                session,
                &ctx,
                &mut on_bytes,
            )?
        };

        let type_counts = deserializer.type_counts().clone();
        let summary_types: Vec<TypeId> = type_counts.keys().copied().collect();
        if size == 0 || summary_types.is_empty() {
            return Err(StorageError::NoChanges.into());
        }

        // First counter snapshot: the pre-geometry frontier. Fatal if the
        // stream left no allocation trace.
        let counters =
            OidCounters::snapshot(&self.catalog, &summary_types, session.start_oids(), false)?;
        concrete.oid_counters = counters.to_bytes();

        fix_inverses(session, &ctx, &summary_types, progress)?;

        progress("Generating geometry", Some(0));
        let generated = {
            let mut on_geometry = |pct: u32| progress("Generating geometry", Some(pct));
            geometry.generate(user.oid, session, &ctx, &mut on_geometry)?
        };
        concrete.multiplier_to_mm = generated.multiplier_to_mm;
        concrete.bounds = generated.bounds;
        concrete.bounds_untransformed = generated.bounds_untransformed;
        concrete.densities = DensityCollection::from_entries(
            generated
                .densities
                .into_iter()
                .map(|d| Density {
                    type_name: d.type_name,
                    density: d.density,
                    triangles_below: d.triangles,
                    volume: d.volume,
                    geometry_info_oid: d.geometry_info_oid,
                })
                .collect(),
        );
        for revision in &mut revisions {
            revision.has_geometry = true;
        }

        // Second snapshot now that geometry allocated its own oids; any
        // cached decode of the first array is stale.
        let counters =
            OidCounters::snapshot(&self.catalog, &summary_types, session.start_oids(), true)?;
        concrete.oid_counters = counters.to_bytes();
        self.counters_cache.invalidate(concrete.oid);

        progress("Finalizing revision", None);
        concrete.size = size;
        concrete.summary = type_counts
            .iter()
            .map(|(t, count)| (self.catalog.name_of(*t).to_string(), *count))
            .collect();
        if let Some(mut header) = deserializer.header() {
            header.oid = session.new_entity_oid::<ModelHeader>()?;
            session.store_entity(&header)?;
            concrete.header = Some(header.oid);
        }

        for revision in &mut revisions {
            revision.size += size;
            self.aggregate_revision(session, revision, &concrete)?;
        }

        // Service links land on the primary revision.
        if let Some(service) = request.new_service {
            revisions[0].services_linked.push(service);
        }
        if let Some(service) = auth.linked_service() {
            revisions[0].service = Some(service);
        }

        // The previous concrete revision's payload is superseded and may be
        // physically cleaned up later.
        if let Some(prior_oid) = project.concrete_revisions.last().copied() {
            if let Some(mut prior) = session.fetch_entity::<ConcreteRevision>(prior_oid)? {
                prior.clear = true;
                session.store_entity(&prior)?;
            }
        }
        project.concrete_revisions.push(concrete.oid);

        let audit_oid = session.new_entity_oid::<NewRevisionAdded>()?;
        session.store_entity(&NewRevisionAdded {
            oid: audit_oid,
            date: now_millis(),
            executor: user.oid,
            revision: ctx.roid,
            project: project.oid,
            access_method: request.access_method,
        })?;

        let report = CheckinReport {
            file_name: request.file_name.clone(),
            file_size: bytes_read,
            object_count: size,
            deserializer: request.deserializer_name.clone(),
        };
        self.attach_report(session, &mut revisions[0], project, user, &report)?;

        let notifier = self.notifier.clone();
        let notification = NewRevisionNotification {
            project: project.oid,
            revision: ctx.roid,
        };
        session.add_post_commit(Box::new(move |_: &mut Session| {
            notifier.notify(notification)
        }));
        let poid = project.oid;
        session.add_post_commit(Box::new(
            move |s: &mut Session| -> Result<(), CheckinError> {
                if let Some(mut p) = s.fetch_entity::<Project>(poid)? {
                    p.finish_checkin();
                    s.store_entity(&p)?;
                }
                Ok(())
            },
        ));

        session.store_entity(&concrete)?;
        for revision in &revisions {
            session.store_entity(revision)?;
        }
        session.store_entity(&*project)?;

        Ok(CheckinOutcome {
            concrete_revision: concrete.oid,
            revision: ctx.roid,
            rid: concrete.rid,
            size,
            bounds: concrete.bounds,
        })
    }

    /// Create the new concrete revision and one logical revision on the
    /// project and on each super-project up the chain. Super-projects are
    /// staged here; the checked-in project itself is stored at the end of
    /// the run.
    fn create_revisions(
        &self,
        session: &mut Session,
        project: &mut Project,
        user: &User,
        comment: &str,
    ) -> Result<(ConcreteRevision, Vec<Revision>), CheckinError> {
        let croid = session.new_entity_oid::<ConcreteRevision>()?;
        let rid = project.concrete_revisions.len() as u32 + 1;
        let mut concrete = ConcreteRevision::new(croid, rid, project.oid);
        let mut revisions = Vec::new();

        let roid = session.new_entity_oid::<Revision>()?;
        let mut revision = Revision::new(roid, project.oid, user.oid, comment);
        revision.concrete_revisions.push(croid);
        concrete.revisions.push(roid);
        project.revisions.push(roid);
        revisions.push(revision);

        let mut parent = project.parent;
        while let Some(parent_oid) = parent {
            let mut owner: Project = session
                .fetch_entity(parent_oid)?
                .ok_or(UserError::InvalidProject(parent_oid))?;
            let roid = session.new_entity_oid::<Revision>()?;
            let mut revision = Revision::new(roid, owner.oid, user.oid, comment);
            revision.concrete_revisions.push(croid);
            concrete.revisions.push(roid);
            owner.revisions.push(roid);
            parent = owner.parent;
            session.store_entity(&owner)?;
            revisions.push(revision);
        }
        Ok((concrete, revisions))
    }

    /// Recompute a revision's aggregates as pure folds over all of its
    /// concrete revisions. `current` stands in for its own stored copy,
    /// which is not persisted yet.
    fn aggregate_revision(
        &self,
        session: &Session,
        revision: &mut Revision,
        current: &ConcreteRevision,
    ) -> Result<(), CheckinError> {
        let mut bounds = Bounds::EMPTY;
        let mut bounds_mm = Bounds::EMPTY;
        let mut untransformed = Bounds::EMPTY;
        let mut untransformed_mm = Bounds::EMPTY;
        let mut collections = Vec::new();

        for croid in &revision.concrete_revisions {
            let concrete: ConcreteRevision = if *croid == current.oid {
                current.clone()
            } else {
                session.fetch_entity(*croid)?.ok_or_else(|| {
                    StorageError::Engine(format!("concrete revision {croid} missing"))
                })?
            };
            let mm = concrete.multiplier_to_mm as f64;
            bounds = bounds.merge(&concrete.bounds);
            bounds_mm = bounds_mm.merge(&concrete.bounds.scaled(mm));
            untransformed = untransformed.merge(&concrete.bounds_untransformed);
            untransformed_mm = untransformed_mm.merge(&concrete.bounds_untransformed.scaled(mm));
            collections.push(concrete.densities);
        }

        let (densities, nr_triangles) = DensityCollection::aggregate(collections.iter());
        revision.bounds = bounds;
        revision.bounds_mm = bounds_mm;
        revision.bounds_untransformed = untransformed;
        revision.bounds_untransformed_mm = untransformed_mm;
        revision.densities = densities;
        revision.nr_triangles = nr_triangles;
        Ok(())
    }

    /// Attach the checkin report to the revision, once as HTML and once as
    /// JSON.
    fn attach_report(
        &self,
        session: &mut Session,
        revision: &mut Revision,
        project: &Project,
        user: &User,
        report: &CheckinReport,
    ) -> Result<(), CheckinError> {
        let html = report.to_html().into_bytes();
        let json = report.to_json()?.into_bytes();
        for (payload, mime, extension) in [
            (html, "text/html", "html"),
            (json, "application/json", "json"),
        ] {
            let file_oid = session.new_entity_oid::<FileBlob>()?;
            let file = FileBlob {
                oid: file_oid,
                filename: format!("checkinreport.{extension}"),
                mime: mime.to_string(),
                size: payload.len() as u64,
                data: payload,
            };
            session.store_entity(&file)?;

            let data_oid = session.new_entity_oid::<ExtendedData>()?;
            session.store_entity(&ExtendedData {
                oid: data_oid,
                title: "Checkin report".to_string(),
                added: now_millis(),
                size: file.size,
                file: file_oid,
                user: user.oid,
                project: project.oid,
                revision: revision.oid,
            })?;
            revision.extended_data.push(data_oid);
        }
        Ok(())
    }

    // =========================================================================
    // Abort path
    // =========================================================================

    /// Unwind a failed checkin: discard staged writes, sweep write-through
    /// records of the aborted revision, and release the project lock in an
    /// independent transaction. Always returns the original cause.
    fn abort(
        &self,
        session: &mut Session,
        poid: Oid,
        pid: u32,
        rid: u32,
        cause: CheckinError,
    ) -> CheckinError {
        tracing::warn!(project = %poid, error = %cause, "checkin aborted");
        session.abort();
        if rid > 0 && !session.start_oids().is_empty() {
            let stats = rollback(
                self.store.as_ref(),
                &self.catalog,
                pid,
                rid,
                session.start_oids(),
            );
            if stats.tables_failed > 0 {
                tracing::warn!(
                    failed = stats.tables_failed,
                    "rollback left tables unswept"
                );
            }
        }
        if let Err(e) = self.release_lock(poid) {
            tracing::error!(project = %poid, error = %e, "failed to release checkin lock");
        }
        cause
    }

    fn release_lock(&self, poid: Oid) -> Result<(), CheckinError> {
        let mut session = self.session();
        if let Some(mut project) = session.fetch_entity::<Project>(poid)? {
            project.finish_checkin();
            session.store_entity(&project)?;
        }
        session.commit()?;
        Ok(())
    }
}

/// Comments must be printable and bounded.
fn validate_comment(comment: &str) -> Result<(), UserError> {
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(UserError::InvalidComment(format!(
            "comment exceeds {MAX_COMMENT_LEN} characters"
        )));
    }
    if comment.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(UserError::InvalidComment(
            "comment contains control characters".to_string(),
        ));
    }
    Ok(())
}
