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

//! Stage orchestration
//!
//! The four stages run as separate commands so a crashed stage can be re-run
//! on its own: each consumes the persisted output of the previous one and
//! writes its own through an atomic promote. Stage outputs checked here are
//! length-validated against the graph, so running against the wrong snapshot
//! fails early instead of producing garbage tables.

use std::path::Path;
use std::time::Instant;

use provdb_core::error::{ProvError, Result};
use provdb_core::graph::GraphSource;
use provdb_core::store::TableStore;

use crate::dense::DenseTimestamps;
use crate::filters::NodeFilter;
use crate::frontier::{compute_frontier, load_frontier_set, write_frontier_set};
use crate::layout::{EARLIEST_TIMESTAMPS_FILE, MAX_LEAF_TIMESTAMPS_FILE};
use crate::max_leaf::compute_max_leaf;
use crate::relations::{build_relations, RelationsSummary};
use crate::timestamps::compute_earliest_timestamps;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub workers: usize,
    pub buckets: usize,
    pub node_filter: NodeFilter,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            buckets: 8,
            node_filter: NodeFilter::Heads,
        }
    }
}

impl BuildConfig {
    pub fn pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ProvError::Internal(format!("cannot build thread pool: {e}")))
    }
}

fn load_dense(
    store: &dyn TableStore,
    file: &str,
    expected_len: usize,
    produced_by: &str,
) -> Result<DenseTimestamps> {
    if !store.exists(file)? {
        return Err(ProvError::IncompleteInput(format!(
            "{file} is missing; run `{produced_by}` first"
        )));
    }
    let array = DenseTimestamps::from_bytes(&store.read(file)?, file)?;
    if array.len() != expected_len {
        return Err(ProvError::IncompleteInput(format!(
            "{file} covers {} nodes but the graph has {expected_len}; \
             it was built against a different snapshot",
            array.len()
        )));
    }
    Ok(array)
}

pub fn load_earliest(store: &dyn TableStore, num_nodes: usize) -> Result<DenseTimestamps> {
    load_dense(store, EARLIEST_TIMESTAMPS_FILE, num_nodes, "index earliest-timestamps")
}

pub fn load_max_leaf(store: &dyn TableStore, num_nodes: usize) -> Result<DenseTimestamps> {
    load_dense(
        store,
        MAX_LEAF_TIMESTAMPS_FILE,
        num_nodes,
        "index directory-max-leaf-timestamps",
    )
}

pub fn run_earliest_timestamps<G: GraphSource>(
    graph: &G,
    store: &dyn TableStore,
    config: &BuildConfig,
) -> Result<()> {
    let start = Instant::now();
    let pool = config.pool()?;
    let earliest = compute_earliest_timestamps(graph, config.node_filter, &pool);
    store.write(EARLIEST_TIMESTAMPS_FILE, &earliest.to_bytes())?;
    tracing::info!(
        "computed earliest timestamps for {} nodes in {:?}",
        earliest.len(),
        start.elapsed()
    );
    Ok(())
}

pub fn run_max_leaf_timestamps<G: GraphSource>(
    graph: &G,
    store: &dyn TableStore,
    config: &BuildConfig,
) -> Result<()> {
    let start = Instant::now();
    let pool = config.pool()?;
    let earliest = load_earliest(store, graph.num_nodes() as usize)?;
    let max_leaf = compute_max_leaf(graph, &earliest, &pool);
    store.write(MAX_LEAF_TIMESTAMPS_FILE, &max_leaf.to_bytes())?;
    tracing::info!("computed directory max-leaf timestamps in {:?}", start.elapsed());
    Ok(())
}

pub fn run_frontier<G: GraphSource>(
    graph: &G,
    store: &dyn TableStore,
    staging_root: &Path,
    config: &BuildConfig,
) -> Result<()> {
    let start = Instant::now();
    let pool = config.pool()?;
    let max_leaf = load_max_leaf(store, graph.num_nodes() as usize)?;
    let ids = compute_frontier(graph, &max_leaf, config.node_filter, &pool);
    tracing::info!("frontier has {} directories ({:?})", ids.len(), start.elapsed());
    write_frontier_set(store, staging_root, &ids, config.buckets)
}

pub fn run_relations<G: GraphSource>(
    graph: &G,
    store: &dyn TableStore,
    staging_root: &Path,
    config: &BuildConfig,
) -> Result<RelationsSummary> {
    let start = Instant::now();
    let pool = config.pool()?;
    let num_nodes = graph.num_nodes() as usize;
    let max_leaf = load_max_leaf(store, num_nodes)?;
    let frontier = load_frontier_set(store, num_nodes)?;
    let summary = build_relations(
        graph,
        &max_leaf,
        &frontier,
        config.node_filter,
        config.buckets,
        store,
        staging_root,
        &pool,
    )?;
    tracing::info!(
        "relation tables written in {:?}: {} direct rows, {} frontier rows, {} flattened rows",
        start.elapsed(),
        summary.crnf.rows,
        summary.fdir.rows,
        summary.cfd.rows,
    );
    Ok(summary)
}

/// All four stages in order, against one store.
pub fn run_full_build<G: GraphSource>(
    graph: &G,
    store: &dyn TableStore,
    staging_root: &Path,
    config: &BuildConfig,
) -> Result<RelationsSummary> {
    run_earliest_timestamps(graph, store, config)?;
    run_max_leaf_timestamps(graph, store, config)?;
    run_frontier(graph, store, staging_root, config)?;
    run_relations(graph, store, staging_root, config)
}
