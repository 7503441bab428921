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

//! Stage D: the relation tables
//!
//! One walk per anchor, using the frontier as a cut. Hitting a directory that
//! is a frontier *for this anchor* (member of the set and strictly older than
//! the anchor) emits a `frontier_directories_in_revisions` row and stops;
//! every content reached without crossing such a cut emits a
//! `contents_in_revisions_without_frontiers` row. Separately, each frontier
//! directory's subtree is flattened once into
//! `contents_in_frontier_directories`.
//!
//! Walks track concrete paths, so a directory shared between two branches of
//! one tree is visited once per occurrence: a content present twice yields
//! one row per distinct path. Within one anchor a frontier directory emits a
//! single row, keeping the lexicographically smallest path.
//!
//! The `nodes` table (node id to SWHID, sorted and partitioned by node id)
//! is produced here too, completing the table set; the run finishes by
//! writing `MANIFEST.json` binding everything to the graph snapshot.

use std::path::Path;

use rayon::prelude::*;

use provdb_core::error::Result;
use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::path;
use provdb_core::store::TableStore;
use provdb_core::swhid::NodeType;

use crate::dense::DenseTimestamps;
use crate::filters::{is_traversal_root, NodeFilter};
use crate::frontier::FrontierSet;
use crate::layout::{
    cfd_schema, crnf_schema, fdir_schema, nodes_schema, Manifest, MANIFEST_FILE, TABLE_CFD,
    TABLE_CRNF, TABLE_FDIR, TABLE_FRONTIER_SET, TABLE_NODES,
};
use crate::writer::{NodeRow, PartitionedWriter, RelationRow, WriteSummary};

#[derive(Debug, Default, Clone, Copy)]
pub struct RelationsSummary {
    pub fdir: WriteSummary,
    pub cfd: WriteSummary,
    pub crnf: WriteSummary,
    pub nodes: WriteSummary,
}

pub fn build_relations<G: GraphSource>(
    graph: &G,
    max_leaf: &DenseTimestamps,
    frontier: &FrontierSet,
    filter: NodeFilter,
    buckets: usize,
    store: &dyn TableStore,
    staging_root: &Path,
    pool: &rayon::ThreadPool,
) -> Result<RelationsSummary> {
    let num_nodes = graph.num_nodes();

    let fdir_writer = PartitionedWriter::new(fdir_schema(), buckets);
    let crnf_writer = PartitionedWriter::new(crnf_schema(), buckets);
    pool.install(|| {
        (0..num_nodes).into_par_iter().for_each(|node| {
            emit_anchor_rows(graph, max_leaf, frontier, filter, node, &fdir_writer, &crnf_writer);
        });
    });

    let cfd_writer = PartitionedWriter::new(cfd_schema(), buckets);
    let frontier_ids: Vec<NodeId> = frontier.iter().collect();
    pool.install(|| {
        frontier_ids.par_iter().for_each(|&dir| {
            emit_frontier_contents(graph, dir, &cfd_writer);
        });
    });

    let nodes_writer = PartitionedWriter::new(nodes_schema(), buckets);
    pool.install(|| {
        (0..num_nodes).into_par_iter().for_each(|node| {
            if let Some(swhid) = graph.swhid(node) {
                nodes_writer.append(NodeRow {
                    node_id: node,
                    swhid: swhid.to_bytes(),
                });
            }
        });
    });

    let summary = RelationsSummary {
        fdir: fdir_writer.finish(store, staging_root, TABLE_FDIR)?,
        crnf: crnf_writer.finish(store, staging_root, TABLE_CRNF)?,
        cfd: cfd_writer.finish(store, staging_root, TABLE_CFD)?,
        nodes: nodes_writer.finish(store, staging_root, TABLE_NODES)?,
    };

    let manifest = Manifest {
        snapshot_id: graph.snapshot_id().to_string(),
        buckets,
        node_filter: filter.to_string(),
        tables: vec![
            TABLE_NODES.to_string(),
            TABLE_FDIR.to_string(),
            TABLE_CFD.to_string(),
            TABLE_CRNF.to_string(),
            TABLE_FRONTIER_SET.to_string(),
        ],
    };
    store.write(
        MANIFEST_FILE,
        serde_json::to_vec_pretty(&manifest)
            .expect("manifest serialization cannot fail")
            .as_slice(),
    )?;

    Ok(summary)
}

/// Walks one anchor's tree with the frontier as a cut.
fn emit_anchor_rows<G: GraphSource>(
    graph: &G,
    max_leaf: &DenseTimestamps,
    frontier: &FrontierSet,
    filter: NodeFilter,
    revrel: NodeId,
    fdir_writer: &PartitionedWriter<RelationRow>,
    crnf_writer: &PartitionedWriter<RelationRow>,
) {
    if !is_traversal_root(graph, filter, revrel) {
        return;
    }
    let Some(root) = graph.root_directory(revrel) else {
        return;
    };
    let date = graph.committer_date(revrel);

    let cuts_here = |dir: NodeId| -> bool {
        frontier.contains(dir)
            && date.is_some_and(|date| max_leaf.get(dir).is_some_and(|newest| newest < date))
    };

    let mut fdir_rows: Vec<(NodeId, Vec<u8>)> = Vec::new();
    let mut crnf_rows: Vec<(NodeId, Vec<u8>)> = Vec::new();

    // per-path walk: no visited set, a shared directory is seen once per path
    let mut stack: Vec<(NodeId, Vec<u8>)> = vec![(root, Vec::new())];
    while let Some((dir, prefix)) = stack.pop() {
        if cuts_here(dir) {
            fdir_rows.push((dir, prefix));
            continue;
        }
        for entry in graph.directory_entries(dir) {
            let entry_path = path::join(&prefix, &entry.name);
            match graph.node_type(entry.target) {
                Some(NodeType::Content) => crnf_rows.push((entry.target, entry_path)),
                Some(NodeType::Directory) => stack.push((entry.target, entry_path)),
                _ => {}
            }
        }
    }

    // one row per frontier directory, smallest path wins
    fdir_rows.sort();
    fdir_rows.dedup_by_key(|(dir, _)| *dir);
    fdir_writer.append_all(fdir_rows.into_iter().map(|(dir, prefix)| RelationRow {
        key: dir,
        value: revrel,
        path: prefix,
    }));

    crnf_rows.sort();
    crnf_rows.dedup();
    crnf_writer.append_all(crnf_rows.into_iter().map(|(content, content_path)| RelationRow {
        key: content,
        value: revrel,
        path: content_path,
    }));
}

/// Flattens one frontier directory's subtree; every occurrence of a content
/// is preserved with its own relative path.
fn emit_frontier_contents<G: GraphSource>(
    graph: &G,
    frontier_dir: NodeId,
    cfd_writer: &PartitionedWriter<RelationRow>,
) {
    let mut rows: Vec<(NodeId, Vec<u8>)> = Vec::new();
    let mut stack: Vec<(NodeId, Vec<u8>)> = vec![(frontier_dir, Vec::new())];
    while let Some((dir, prefix)) = stack.pop() {
        for entry in graph.directory_entries(dir) {
            let entry_path = path::join(&prefix, &entry.name);
            match graph.node_type(entry.target) {
                Some(NodeType::Content) => rows.push((entry.target, entry_path)),
                Some(NodeType::Directory) => stack.push((entry.target, entry_path)),
                _ => {}
            }
        }
    }
    rows.sort();
    rows.dedup();
    cfd_writer.append_all(rows.into_iter().map(|(content, content_path)| RelationRow {
        key: content,
        value: frontier_dir,
        path: content_path,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::compute_frontier;
    use crate::max_leaf::compute_max_leaf;
    use crate::timestamps::compute_earliest_timestamps;
    use provdb_core::graph::GraphBuilder;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    struct Collected {
        fdir: Vec<(u64, u64, Vec<u8>)>,
        crnf: Vec<(u64, u64, Vec<u8>)>,
        cfd: Vec<(u64, u64, Vec<u8>)>,
    }

    /// Runs the stage machinery in memory, without the parquet layer.
    fn run<G: GraphSource>(graph: &G) -> Collected {
        let pool = pool();
        let earliest = compute_earliest_timestamps(graph, NodeFilter::All, &pool);
        let max_leaf = compute_max_leaf(graph, &earliest, &pool);
        let ids = compute_frontier(graph, &max_leaf, NodeFilter::All, &pool);
        let frontier = FrontierSet::from_sorted_ids(&ids, graph.num_nodes() as usize);

        let fdir_writer = PartitionedWriter::new(fdir_schema(), 1);
        let crnf_writer = PartitionedWriter::new(crnf_schema(), 1);
        for node in 0..graph.num_nodes() {
            emit_anchor_rows(
                graph,
                &max_leaf,
                &frontier,
                NodeFilter::All,
                node,
                &fdir_writer,
                &crnf_writer,
            );
        }
        let cfd_writer = PartitionedWriter::new(cfd_schema(), 1);
        for dir in frontier.iter() {
            emit_frontier_contents(graph, dir, &cfd_writer);
        }

        Collected {
            fdir: drain(fdir_writer),
            crnf: drain(crnf_writer),
            cfd: drain(cfd_writer),
        }
    }

    fn drain(writer: PartitionedWriter<RelationRow>) -> Vec<(u64, u64, Vec<u8>)> {
        let mut rows: Vec<_> = writer
            .into_rows()
            .into_iter()
            .map(|r| (r.key, r.value, r.path))
            .collect();
        rows.sort();
        rows
    }

    /// Scenario: two anchors over one root; the newer one goes through the
    /// frontier, the older one keeps its contents in the direct table.
    #[test]
    fn test_two_revisions_one_root() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let lib = builder.directory();
        let root = builder.directory();
        builder.entry(lib, b"a.c", content);
        builder.entry(root, b"lib", lib);
        let r1 = builder.revision(Some(10));
        builder.edge(r1, root);
        let r2 = builder.revision(Some(20));
        builder.edge(r2, root);
        let graph = builder.build().unwrap();

        let rows = run(&graph);
        assert_eq!(rows.fdir, vec![(root, r2, b"".to_vec())]);
        assert_eq!(rows.crnf, vec![(content, r1, b"lib/a.c".to_vec())]);
        assert_eq!(rows.cfd, vec![(content, root, b"lib/a.c".to_vec())]);
    }

    /// Scenario: duplicated content in one tree yields one row per path.
    #[test]
    fn test_duplicate_paths_preserved() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let sub = builder.directory();
        let root = builder.directory();
        builder.entry(sub, b"a", content);
        builder.entry(root, b"a", content);
        builder.entry(root, b"b", sub);
        let rev = builder.revision(Some(10));
        builder.edge(rev, root);
        let graph = builder.build().unwrap();

        let rows = run(&graph);
        assert_eq!(
            rows.crnf,
            vec![
                (content, rev, b"a".to_vec()),
                (content, rev, b"b/a".to_vec()),
            ]
        );
    }

    /// Scenario: an undated anchor still lands its contents in the direct
    /// table and never uses the frontier.
    #[test]
    fn test_undated_anchor_bypasses_frontier() {
        let mut builder = GraphBuilder::new("s");
        let content = builder.content();
        let root = builder.directory();
        builder.entry(root, b"f", content);
        let dated = builder.revision(Some(10));
        builder.edge(dated, root);
        let newer = builder.revision(Some(20));
        builder.edge(newer, root);
        let undated = builder.revision(None);
        builder.edge(undated, root);
        let graph = builder.build().unwrap();

        let rows = run(&graph);
        // root is a frontier via `newer`, but the undated anchor descends
        assert!(rows.fdir.contains(&(root, newer, b"".to_vec())));
        assert!(rows.crnf.contains(&(content, undated, b"f".to_vec())));
        assert!(rows.crnf.contains(&(content, dated, b"f".to_vec())));
    }

    /// Scenario: empty directories participate without emitting rows.
    #[test]
    fn test_empty_directory_emits_nothing() {
        let mut builder = GraphBuilder::new("s");
        let empty = builder.directory();
        let root = builder.directory();
        builder.entry(root, b"empty", empty);
        let rev = builder.revision(Some(10));
        builder.edge(rev, root);
        let graph = builder.build().unwrap();

        let rows = run(&graph);
        assert!(rows.fdir.is_empty());
        assert!(rows.crnf.is_empty());
        assert!(rows.cfd.is_empty());
    }
}
