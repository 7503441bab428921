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

//! ProvDB Core
//!
//! Fundamental types shared across the workspace: artifact identifiers,
//! raw-byte tree paths, the Elias-Fano sidecar structure, the table store
//! abstraction, graph access, deadlines, settings, and metrics.
//!
//! The interesting machinery lives in the sibling crates: `provdb-index`
//! builds the provenance tables from a graph snapshot, `provdb-query` serves
//! point lookups over them, `provdb-grpc` is the wire facade.

pub mod config;
pub mod deadline;
pub mod ef;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod path;
pub mod store;
pub mod swhid;

pub use config::Settings;
pub use deadline::Deadline;
pub use ef::EliasFano;
pub use error::{ProvError, Result};
pub use graph::{DirEntry, GraphBuilder, GraphData, GraphSource, MemoryGraph, NodeId};
pub use metrics::Metrics;
pub use store::{store_from_url, LocalFsStore, ObjectStoreBackend, TableStore};
pub use swhid::{NodeType, Swhid};
