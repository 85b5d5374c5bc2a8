// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # modelbase-checkin
//!
//! The streaming checkin pipeline: a [`coordinator::CheckinCoordinator`]
//! drives admission, the streaming ingest through a pluggable
//! [`deserializer::StreamingDeserializer`], the [`inverses`] fixup pass,
//! geometry generation, revision bookkeeping and the commit — plus the
//! abort path that sweeps write-through records and releases the project
//! lock when anything fails.

pub mod auth;
pub mod context;
pub mod coordinator;
pub mod deserializer;
pub mod geometry;
pub mod inverses;
pub mod notify;
pub mod report;

pub use auth::Authorization;
pub use context::QueryContext;
pub use coordinator::{CheckinCoordinator, CheckinOutcome, CheckinRequest};
pub use deserializer::StreamingDeserializer;
pub use geometry::{GeneratedDensity, GeneratedGeometry, GeometryGenerator};
pub use inverses::fix_inverses;
pub use notify::{is_valid_email, NewRevisionNotification, Notifier};
pub use report::CheckinReport;
