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

//! End-to-end builder runs over the fixture archive.

use std::collections::HashSet;
use std::path::Path;

use arrow::array::AsArray;
use arrow::datatypes::UInt64Type;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use provdb_core::graph::{GraphSource, MemoryGraph, NodeId};
use provdb_core::path::join as join_paths;
use provdb_core::store::{LocalFsStore, TableStore};
use provdb_core::swhid::NodeType;

use provdb_index::dense::DenseTimestamps;
use provdb_index::filters::NodeFilter;
use provdb_index::frontier::load_frontier_set;
use provdb_index::layout::{
    Manifest, EARLIEST_TIMESTAMPS_FILE, MANIFEST_FILE, MAX_LEAF_TIMESTAMPS_FILE, TABLE_CFD,
    TABLE_CRNF, TABLE_FDIR, TABLE_FRONTIER_SET, TABLE_NODES,
};
use provdb_index::pipeline::BuildConfig;
use provdb_index::testdb::{generate, sample_archive, SampleNodes, GRAPH_FILE};

fn config() -> BuildConfig {
    BuildConfig {
        workers: 2,
        buckets: 4,
        node_filter: NodeFilter::Heads,
    }
}

fn build(dir: &Path) -> (LocalFsStore, MemoryGraph, SampleNodes) {
    generate(dir, &config()).unwrap();
    let store = LocalFsStore::new(dir).unwrap();
    let (data, nodes) = sample_archive();
    (store, MemoryGraph::from_data(data).unwrap(), nodes)
}

#[test]
fn test_full_build_produces_complete_layout() {
    let dir = tempfile::TempDir::new().unwrap();
    let (store, _graph, _) = build(dir.path());

    assert!(store.exists(GRAPH_FILE).unwrap());
    assert!(store.exists(EARLIEST_TIMESTAMPS_FILE).unwrap());
    assert!(store.exists(MAX_LEAF_TIMESTAMPS_FILE).unwrap());
    assert!(store.exists(MANIFEST_FILE).unwrap());

    for table in [TABLE_NODES, TABLE_FDIR, TABLE_CFD, TABLE_CRNF, TABLE_FRONTIER_SET] {
        assert!(store.exists(&format!("{table}/_SUCCESS")).unwrap(), "{table} incomplete");
        let files = store.list(table).unwrap();
        let parts: Vec<_> = files.iter().filter(|f| f.ends_with(".parquet")).collect();
        let sidecars: Vec<_> = files.iter().filter(|f| f.ends_with(".ef")).collect();
        assert!(!parts.is_empty(), "{table} has no part files");
        assert_eq!(parts.len(), sidecars.len(), "{table} parts and sidecars disagree");
    }

    let manifest: Manifest =
        serde_json::from_slice(&store.read(MANIFEST_FILE).unwrap()).unwrap();
    assert_eq!(manifest.snapshot_id, "sample-archive-v1");
    assert_eq!(manifest.buckets, 4);
}

#[test]
fn test_stage_outputs_match_fixture_semantics() {
    let dir = tempfile::TempDir::new().unwrap();
    let (store, graph, nodes) = build(dir.path());
    let num_nodes = provdb_core::graph::GraphSource::num_nodes(&graph) as usize;

    let earliest =
        DenseTimestamps::from_bytes(&store.read(EARLIEST_TIMESTAMPS_FILE).unwrap(), "e").unwrap();
    assert_eq!(earliest.get(nodes.c_shared), Some(10));
    assert_eq!(earliest.get(nodes.c_dup), Some(30));
    assert_eq!(earliest.get(nodes.c_dangling), None);

    let max_leaf =
        DenseTimestamps::from_bytes(&store.read(MAX_LEAF_TIMESTAMPS_FILE).unwrap(), "m").unwrap();
    assert_eq!(max_leaf.get(nodes.d_root), Some(10));
    assert_eq!(max_leaf.get(nodes.d_lib), Some(10));

    let frontier = load_frontier_set(&store, num_nodes).unwrap();
    assert_eq!(frontier.iter().collect::<Vec<_>>(), vec![nodes.d_root]);

    // frontier invariant: strictly older than every anchor it cuts for
    for anchor in [nodes.r_new, nodes.rel] {
        let date = provdb_core::graph::GraphSource::committer_date(&graph, anchor).unwrap();
        assert!(max_leaf.get(nodes.d_root).unwrap() < date);
    }
}

fn read_relation_rows(store: &LocalFsStore, table: &str) -> Vec<(u64, u64, Vec<u8>)> {
    let mut rows = Vec::new();
    for key in store.list(table).unwrap() {
        if !key.ends_with(".parquet") {
            continue;
        }
        let reader = ParquetRecordBatchReaderBuilder::try_new(store.read(&key).unwrap())
            .unwrap()
            .build()
            .unwrap();
        for batch in reader {
            let batch = batch.unwrap();
            let keys = batch.column(0).as_primitive::<UInt64Type>();
            let values = batch.column(1).as_primitive::<UInt64Type>();
            let paths = batch.column(2).as_binary::<i32>();
            for i in 0..batch.num_rows() {
                rows.push((keys.value(i), values.value(i), paths.value(i).to_vec()));
            }
        }
    }
    rows.sort();
    rows
}

/// Every `(content, anchor, path)` reachable in the graph, walked the same
/// way the builder walks: per-path, heads only.
fn reachable_triples(graph: &MemoryGraph) -> HashSet<(NodeId, NodeId, Vec<u8>)> {
    let mut expected = HashSet::new();
    for anchor in 0..graph.num_nodes() {
        if !provdb_index::filters::is_traversal_root(graph, NodeFilter::Heads, anchor) {
            continue;
        }
        let Some(root) = graph.root_directory(anchor) else {
            continue;
        };
        let mut stack = vec![(root, Vec::new())];
        while let Some((dir, prefix)) = stack.pop() {
            for entry in graph.directory_entries(dir) {
                let entry_path = join_paths(&prefix, &entry.name);
                match graph.node_type(entry.target) {
                    Some(NodeType::Content) => {
                        expected.insert((entry.target, anchor, entry_path));
                    }
                    Some(NodeType::Directory) => stack.push((entry.target, entry_path)),
                    _ => {}
                }
            }
        }
    }
    expected
}

/// Coverage and path faithfulness: the direct table united with the composed
/// frontier tables reproduces exactly the graph's `(content, anchor)`
/// relation, and never invents a path that does not exist in the tree.
#[test]
fn test_union_covers_reachability_with_faithful_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    let (store, graph, _) = build(dir.path());

    let crnf = read_relation_rows(&store, TABLE_CRNF);
    let cfd = read_relation_rows(&store, TABLE_CFD);
    let fdir = read_relation_rows(&store, TABLE_FDIR);

    let mut actual: HashSet<(NodeId, NodeId, Vec<u8>)> = crnf.into_iter().collect();
    for (content, frontier_dir, sub_path) in &cfd {
        for (dir_id, anchor, prefix) in &fdir {
            if dir_id == frontier_dir {
                actual.insert((*content, *anchor, join_paths(prefix, sub_path)));
            }
        }
    }

    let expected = reachable_triples(&graph);

    // faithfulness: every produced triple is a real path in the anchor's tree
    for triple in &actual {
        assert!(
            expected.contains(triple),
            "table row {triple:?} does not correspond to a tree path"
        );
    }

    // coverage: every reachable (content, anchor) pair is answerable
    let answerable: HashSet<(NodeId, NodeId)> =
        actual.iter().map(|(c, a, _)| (*c, *a)).collect();
    for (content, anchor, _) in &expected {
        assert!(
            answerable.contains(&(*content, *anchor)),
            "pair ({content}, {anchor}) is not covered by any table"
        );
    }
}

#[test]
fn test_rebuild_is_byte_identical() {
    let dir_a = tempfile::TempDir::new().unwrap();
    let dir_b = tempfile::TempDir::new().unwrap();
    let (store_a, _, _) = build(dir_a.path());
    let (store_b, _, _) = build(dir_b.path());

    for table in [TABLE_NODES, TABLE_FDIR, TABLE_CFD, TABLE_CRNF, TABLE_FRONTIER_SET] {
        let files_a = store_a.list(table).unwrap();
        let files_b = store_b.list(table).unwrap();
        assert_eq!(files_a, files_b, "{table} file sets differ");
        for file in files_a.iter().filter(|f| f.ends_with(".ef")) {
            assert_eq!(
                store_a.read(file).unwrap(),
                store_b.read(file).unwrap(),
                "{file} differs between runs"
            );
        }
    }
}

#[test]
fn test_relations_require_prior_stages() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = LocalFsStore::new(dir.path()).unwrap();
    let (data, _) = sample_archive();
    let graph = MemoryGraph::from_data(data).unwrap();

    let err = provdb_index::pipeline::run_relations(&graph, &store, dir.path(), &config());
    assert!(matches!(err, Err(provdb_core::ProvError::IncompleteInput(_))));
}
