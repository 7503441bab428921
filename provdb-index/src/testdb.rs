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

//! Deterministic test archive
//!
//! A small archive exercising the interesting shapes: one root shared by an
//! old and a new revision (so it is a frontier for one but not the other), a
//! duplicated content, an empty directory, an undated revision with an
//! otherwise unreachable content, and a release anchor. `gen-test-database`
//! materializes it as a graph snapshot plus a fully built table set.

use std::path::Path;

use provdb_core::error::Result;
use provdb_core::graph::{GraphBuilder, GraphData, MemoryGraph, NodeId};
use provdb_core::store::LocalFsStore;
use provdb_core::store::TableStore;

use crate::pipeline::{run_full_build, BuildConfig};
use crate::relations::RelationsSummary;

/// File name of the serialized graph snapshot.
pub const GRAPH_FILE: &str = "graph.json";

/// Node ids of the fixture's named actors.
#[derive(Debug, Clone, Copy)]
pub struct SampleNodes {
    /// `lib/a.c` under the shared root.
    pub c_shared: NodeId,
    /// The root shared by `r_old`, `r_new`, and `rel`.
    pub d_root: NodeId,
    pub d_lib: NodeId,
    /// Revision at t=10; the shared root is not a frontier for it.
    pub r_old: NodeId,
    /// Revision at t=20; the shared root is a frontier for it.
    pub r_new: NodeId,
    /// Release at t=40 targeting `r_new`.
    pub rel: NodeId,
    /// Content present at `a` and `b/a` in `r_dup`.
    pub c_dup: NodeId,
    pub r_dup: NodeId,
    /// Content only reachable from the undated revision.
    pub c_dangling: NodeId,
    pub r_undated: NodeId,
    pub origin_one: NodeId,
    pub origin_two: NodeId,
}

pub const ORIGIN_ONE_URL: &str = "https://forge.example/repo1";
pub const ORIGIN_TWO_URL: &str = "https://forge.example/repo2";

/// Builds the fixture archive. Deterministic: node ids and hashes are stable
/// across calls.
pub fn sample_archive() -> (GraphData, SampleNodes) {
    let mut b = GraphBuilder::new("sample-archive-v1");

    // shared root: lib/a.c, used by an old and a new revision plus a release
    let c_shared = b.content();
    let d_lib = b.directory();
    let d_root = b.directory();
    b.entry(d_lib, b"a.c", c_shared);
    b.entry(d_root, b"lib", d_lib);
    let r_old = b.revision(Some(10));
    b.edge(r_old, d_root);
    let r_new = b.revision(Some(20));
    b.edge(r_new, d_root);
    let rel = b.release(Some(40));
    b.edge(rel, r_new);

    // duplicated content plus an empty directory
    let c_dup = b.content();
    let d_sub = b.directory();
    let d_empty = b.directory();
    let d_dup_root = b.directory();
    b.entry(d_sub, b"a", c_dup);
    b.entry(d_dup_root, b"a", c_dup);
    b.entry(d_dup_root, b"b", d_sub);
    b.entry(d_dup_root, b"empty", d_empty);
    let r_dup = b.revision(Some(30));
    b.edge(r_dup, d_dup_root);

    // content whose only containing revision has no date
    let c_dangling = b.content();
    let d_dangling = b.directory();
    b.entry(d_dangling, b"orphan.txt", c_dangling);
    let r_undated = b.revision(None);
    b.edge(r_undated, d_dangling);

    // origins: snapshot one serves the shared-root history, snapshot two the
    // rest
    let snap_one = b.snapshot();
    b.edge(snap_one, r_old);
    b.edge(snap_one, r_new);
    b.edge(snap_one, rel);
    let origin_one = b.origin(ORIGIN_ONE_URL);
    b.edge(origin_one, snap_one);

    let snap_two = b.snapshot();
    b.edge(snap_two, r_dup);
    b.edge(snap_two, r_undated);
    let origin_two = b.origin(ORIGIN_TWO_URL);
    b.edge(origin_two, snap_two);

    let nodes = SampleNodes {
        c_shared,
        d_root,
        d_lib,
        r_old,
        r_new,
        rel,
        c_dup,
        r_dup,
        c_dangling,
        r_undated,
        origin_one,
        origin_two,
    };
    (b.into_data(), nodes)
}

/// Writes the fixture graph and builds its complete table set under `out`.
pub fn generate(out: &Path, config: &BuildConfig) -> Result<RelationsSummary> {
    let (data, _) = sample_archive();
    let store = LocalFsStore::new(out)?;
    store.write(
        GRAPH_FILE,
        &serde_json::to_vec_pretty(&data).expect("graph snapshot serialization cannot fail"),
    )?;
    let graph = MemoryGraph::from_data(data)?;
    run_full_build(&graph, &store, out, config)
}
