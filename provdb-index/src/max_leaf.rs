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

//! Stage B: newest leaf per directory
//!
//! `max_leaf(d)` is the maximum of `earliest(c)` over every content anywhere
//! under `d`. A directory whose subtree holds no dated content gets the
//! unknown sentinel and can never enter the frontier.
//!
//! Directories form a DAG (subtrees are shared), so values are memoized:
//! each worker runs an iterative post-order walk that skips anything already
//! computed. Concurrent recomputation of a shared subtree is harmless; both
//! writers store the same value.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rayon::prelude::*;

use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::swhid::NodeType;

use crate::dense::{DenseTimestamps, UNSET};

pub fn compute_max_leaf<G: GraphSource>(
    graph: &G,
    earliest: &DenseTimestamps,
    pool: &rayon::ThreadPool,
) -> DenseTimestamps {
    let num_nodes = graph.num_nodes() as usize;
    let mut values = Vec::with_capacity(num_nodes);
    values.resize_with(num_nodes, || AtomicI64::new(UNSET));
    let mut done = Vec::with_capacity(num_nodes);
    done.resize_with(num_nodes, || AtomicBool::new(false));

    pool.install(|| {
        (0..num_nodes as NodeId).into_par_iter().for_each(|node| {
            if graph.node_type(node) == Some(NodeType::Directory) {
                compute_subtree(graph, earliest, &values, &done, node);
            }
        });
    });

    DenseTimestamps::from_atomic(values, UNSET)
}

/// Post-order walk computing `max_leaf` for `root` and every directory below
/// it that is not already done.
fn compute_subtree<G: GraphSource>(
    graph: &G,
    earliest: &DenseTimestamps,
    values: &[AtomicI64],
    done: &[AtomicBool],
    root: NodeId,
) {
    if done[root as usize].load(Ordering::Acquire) {
        return;
    }

    let mut stack = vec![(root, false)];
    while let Some((dir, expanded)) = stack.pop() {
        if done[dir as usize].load(Ordering::Acquire) {
            continue;
        }
        if !expanded {
            stack.push((dir, true));
            for entry in graph.directory_entries(dir) {
                if graph.node_type(entry.target) == Some(NodeType::Directory)
                    && !done[entry.target as usize].load(Ordering::Acquire)
                {
                    stack.push((entry.target, false));
                }
            }
        } else {
            let mut newest = UNSET;
            for entry in graph.directory_entries(dir) {
                let candidate = match graph.node_type(entry.target) {
                    Some(NodeType::Content) => earliest.get(entry.target),
                    // children finished first by post-order (or by another
                    // worker); UNSET propagates as "no dated content"
                    Some(NodeType::Directory) => {
                        match values[entry.target as usize].load(Ordering::Acquire) {
                            UNSET => None,
                            value => Some(value),
                        }
                    }
                    _ => None,
                };
                if let Some(candidate) = candidate {
                    newest = newest.max(candidate);
                }
            }
            values[dir as usize].store(newest, Ordering::Release);
            done[dir as usize].store(true, Ordering::Release);
        }
    }
}
