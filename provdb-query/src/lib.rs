// SPDX-License-Identifier: AGPL-3.0-or-later
// ProvDB - Columnar Provenance Index for Software Archives
// Copyright (C) 2026 The ProvDB Authors
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

//! ProvDB Query Engine
//!
//! Point lookups over the provenance tables. Nothing here scans a table: a
//! lookup consults the per-file Elias-Fano sidecar, then row-group and page
//! statistics, and only decodes pages whose key range covers the query. All
//! hot metadata (footers, sidecars, fetched ranges) sits in shared
//! byte-budgeted caches.

pub mod caches;
pub mod chunk;
pub mod engine;
pub mod part;
pub mod table;
pub mod tableset;

pub use engine::{FieldSelection, QueryEngine, WhereIs};
pub use tableset::TableSet;
