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

//! # modelbase-storage
//!
//! Storage layer of the ModelBase checkin pipeline: the raw key-value
//! engine boundary ([`kv::KvStore`]) and an in-memory implementation
//! ([`memory::MemoryKvStore`]), the object record key layout
//! ([`keys::RecordKey`]), the per-checkin transaction scope
//! ([`session::Session`]), the per-type start-OID snapshot and its
//! persisted codec ([`oid_counters::OidCounters`]), and the manual
//! [`rollback`] sweep for counter-versioned tables.

pub mod keys;
pub mod kv;
pub mod memory;
pub mod oid_counters;
pub mod rollback;
pub mod session;

pub use keys::RecordKey;
pub use kv::{KvStore, WriteBatch};
pub use memory::MemoryKvStore;
pub use oid_counters::{OidCounters, OidCountersCache};
pub use rollback::{rollback, RollbackStats};
pub use session::{PostCommitAction, Session};
