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

//! ProvDB Index Builder
//!
//! Batch pipeline turning a graph snapshot into the provenance tables. Four
//! stages, each parallel over node ids and restartable on its own:
//!
//! 1. earliest timestamp per content (atomic-min over anchor walks)
//! 2. newest leaf per directory (memoized post-order over the directory DAG)
//! 3. the isochrone frontier (first strictly-older directory per path)
//! 4. the relation tables, written as hash-partitioned sorted Parquet parts
//!    with Elias-Fano sidecars
//!
//! Everything is immutable once promoted; a new graph snapshot means a new
//! table set.

pub mod dense;
pub mod filters;
pub mod frontier;
pub mod layout;
pub mod max_leaf;
pub mod pipeline;
pub mod relations;
pub mod testdb;
pub mod timestamps;
pub mod writer;

pub use filters::NodeFilter;
pub use pipeline::{run_full_build, BuildConfig};
