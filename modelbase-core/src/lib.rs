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

//! # modelbase-core
//!
//! Data model and type catalog for the ModelBase checkin pipeline: object
//! identity ([`object::Oid`]), the schema consumed by the inverse resolver
//! and the counter codec ([`schema::TypeCatalog`]), persisted store entities
//! ([`model`]), the bounds value type ([`bounds::Bounds`]) and the error
//! taxonomy ([`error`]).
//!
//! This crate is storage-agnostic; the engine boundary lives in
//! `modelbase-storage`.

pub mod bounds;
pub mod error;
pub mod model;
pub mod object;
pub mod schema;

pub use error::{CheckinError, Result, StorageError, UserError};
pub use object::Oid;
pub use schema::{TypeCatalog, TypeId};
