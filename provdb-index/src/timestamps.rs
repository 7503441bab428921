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

//! Stage A: earliest timestamp per content
//!
//! `earliest(c)` is the minimum committer date over every dated revision or
//! release whose tree reaches `c`. Revisions without a date contribute
//! nothing. Walks run in parallel over anchors; the shared array takes
//! atomic minimums, so the result is identical regardless of scheduling.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use rayon::prelude::*;

use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::swhid::NodeType;

use crate::dense::DenseTimestamps;
use crate::filters::{is_traversal_root, NodeFilter};

pub fn compute_earliest_timestamps<G: GraphSource>(
    graph: &G,
    filter: NodeFilter,
    pool: &rayon::ThreadPool,
) -> DenseTimestamps {
    let num_nodes = graph.num_nodes() as usize;
    let mut slots = Vec::with_capacity(num_nodes);
    slots.resize_with(num_nodes, || AtomicI64::new(i64::MAX));

    pool.install(|| {
        (0..num_nodes as NodeId)
            .into_par_iter()
            .for_each(|node| mark_reachable_contents(graph, &slots, filter, node));
    });

    DenseTimestamps::from_atomic(slots, i64::MAX)
}

/// Lowers the earliest timestamp of every content reachable from `revrel` to
/// that anchor's date.
fn mark_reachable_contents<G: GraphSource>(
    graph: &G,
    slots: &[AtomicI64],
    filter: NodeFilter,
    revrel: NodeId,
) {
    if !is_traversal_root(graph, filter, revrel) {
        return;
    }
    let Some(date) = graph.committer_date(revrel) else {
        return;
    };
    let Some(root) = graph.root_directory(revrel) else {
        return;
    };

    let mut stack = vec![root];
    let mut visited = HashSet::new();
    visited.insert(root);
    while let Some(node) = stack.pop() {
        for entry in graph.directory_entries(node) {
            match graph.node_type(entry.target) {
                Some(NodeType::Content) => {
                    slots[entry.target as usize].fetch_min(date, Ordering::Relaxed);
                }
                Some(NodeType::Directory) => {
                    if visited.insert(entry.target) {
                        stack.push(entry.target);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provdb_core::graph::GraphBuilder;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn test_minimum_over_containing_revisions() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let root = builder.directory();
        builder.entry(root, b"f", content);
        let r1 = builder.revision(Some(10));
        builder.edge(r1, root);
        let r2 = builder.revision(Some(20));
        builder.edge(r2, root);
        let graph = builder.build().unwrap();

        let earliest = compute_earliest_timestamps(&graph, NodeFilter::All, &pool());
        assert_eq!(earliest.get(content), Some(10));
    }

    #[test]
    fn test_undated_revision_contributes_nothing() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let root = builder.directory();
        builder.entry(root, b"f", content);
        let rev = builder.revision(None);
        builder.edge(rev, root);
        let graph = builder.build().unwrap();

        let earliest = compute_earliest_timestamps(&graph, NodeFilter::All, &pool());
        assert_eq!(earliest.get(content), None);
    }

    #[test]
    fn test_nested_directories_reached() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let inner = builder.directory();
        let root = builder.directory();
        builder.entry(inner, b"a.c", content);
        builder.entry(root, b"lib", inner);
        let rev = builder.revision(Some(7));
        builder.edge(rev, root);
        let graph = builder.build().unwrap();

        let earliest = compute_earliest_timestamps(&graph, NodeFilter::Heads, &pool());
        assert_eq!(earliest.get(content), Some(7));
    }
}
