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

//! Stage C: the isochrone frontier
//!
//! Scanning each anchor's tree from the root, the first directory on a path
//! that is strictly older than the anchor (`max_leaf(d) < committer_date`)
//! joins the frontier and the walk does not descend past it. The resulting
//! set is an antichain on every single anchor's tree, but one directory may
//! be a frontier with respect to some anchors and not others; stage D
//! re-evaluates the predicate per anchor when it uses the set as a cut.
//!
//! The set is persisted as a single-column sorted table with the usual
//! Elias-Fano sidecars.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use arrow::array::AsArray;
use arrow::datatypes::UInt64Type;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;

use provdb_core::error::{ProvError, Result};
use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::store::{TableStore, SUCCESS_MARKER};
use provdb_core::swhid::NodeType;

use crate::dense::DenseTimestamps;
use crate::filters::{is_traversal_root, NodeFilter};
use crate::layout::{frontier_set_schema, TABLE_FRONTIER_SET};
use crate::writer::{KeyRow, PartitionedWriter};

/// Dense membership bitmap over node ids.
pub struct FrontierSet {
    bits: Vec<u64>,
}

impl FrontierSet {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            bits: vec![0u64; num_nodes.div_ceil(64)],
        }
    }

    pub fn from_sorted_ids(ids: &[NodeId], num_nodes: usize) -> Self {
        let mut set = Self::new(num_nodes);
        for &id in ids {
            set.insert(id);
        }
        set
    }

    pub fn insert(&mut self, node: NodeId) {
        self.bits[node as usize / 64] |= 1u64 << (node % 64);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.bits
            .get(node as usize / 64)
            .is_some_and(|word| word & (1u64 << (node % 64)) != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| (word_idx * 64 + bit) as NodeId)
        })
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }
}

/// Computes the frontier directory ids, sorted.
pub fn compute_frontier<G: GraphSource>(
    graph: &G,
    max_leaf: &DenseTimestamps,
    filter: NodeFilter,
    pool: &rayon::ThreadPool,
) -> Vec<NodeId> {
    let num_nodes = graph.num_nodes() as usize;
    let bits: Vec<AtomicU64> = (0..num_nodes.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();

    pool.install(|| {
        (0..num_nodes as NodeId)
            .into_par_iter()
            .for_each(|node| mark_frontier_for_anchor(graph, max_leaf, filter, &bits, node));
    });

    let mut ids = Vec::new();
    for (word_idx, word) in bits.iter().enumerate() {
        let word = word.load(Ordering::Relaxed);
        for bit in 0..64 {
            if word & (1u64 << bit) != 0 {
                ids.push((word_idx * 64 + bit) as NodeId);
            }
        }
    }
    ids
}

fn mark_frontier_for_anchor<G: GraphSource>(
    graph: &G,
    max_leaf: &DenseTimestamps,
    filter: NodeFilter,
    bits: &[AtomicU64],
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
    while let Some(dir) = stack.pop() {
        if max_leaf.get(dir).is_some_and(|newest| newest < date) {
            bits[dir as usize / 64].fetch_or(1u64 << (dir % 64), Ordering::Relaxed);
            continue; // the walk stops at the frontier
        }
        for entry in graph.directory_entries(dir) {
            if graph.node_type(entry.target) == Some(NodeType::Directory)
                && visited.insert(entry.target)
            {
                stack.push(entry.target);
            }
        }
    }
}

/// Persists the frontier set as a table.
pub fn write_frontier_set(
    store: &dyn TableStore,
    staging_root: &Path,
    ids: &[NodeId],
    buckets: usize,
) -> Result<()> {
    let writer = PartitionedWriter::new(frontier_set_schema(), buckets);
    writer.append_all(ids.iter().map(|&key| KeyRow { key }));
    writer.finish(store, staging_root, TABLE_FRONTIER_SET)?;
    Ok(())
}

/// Loads the frontier set table back into a membership bitmap.
pub fn load_frontier_set(store: &dyn TableStore, num_nodes: usize) -> Result<FrontierSet> {
    if !store.exists(&format!("{TABLE_FRONTIER_SET}/{SUCCESS_MARKER}"))? {
        return Err(ProvError::IncompleteInput(format!(
            "table {TABLE_FRONTIER_SET} is missing or incomplete; run `index directory-frontier` first"
        )));
    }
    let mut set = FrontierSet::new(num_nodes);
    for key in store.list(TABLE_FRONTIER_SET)? {
        if !key.ends_with(".parquet") {
            continue;
        }
        let bytes = store.read(&key)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .and_then(|builder| builder.build())
            .map_err(|e| ProvError::corruption(&key, format!("cannot open frontier part: {e}")))?;
        for batch in reader {
            let batch =
                batch.map_err(|e| ProvError::corruption(&key, format!("cannot decode: {e}")))?;
            let column = batch.column(0).as_primitive_opt::<UInt64Type>().ok_or_else(|| {
                ProvError::corruption(&key, "frontier_dir column is not u64".to_string())
            })?;
            for id in column.iter().flatten() {
                if id as usize >= num_nodes {
                    return Err(ProvError::corruption(
                        &key,
                        format!("frontier id {id} out of range for {num_nodes} nodes"),
                    ));
                }
                set.insert(id);
            }
        }
    }
    Ok(set)
}
