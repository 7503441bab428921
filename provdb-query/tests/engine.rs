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

//! End-to-end query scenarios over a freshly built table set.

use std::sync::Arc;

use provdb_core::config::Settings;
use provdb_core::error::ProvError;
use provdb_core::graph::{GraphSource, MemoryGraph, NodeId};
use provdb_core::metrics::Metrics;
use provdb_core::store::{LocalFsStore, TableStore};
use provdb_core::swhid::{NodeType, Swhid};

use provdb_index::filters::NodeFilter;
use provdb_index::pipeline::BuildConfig;
use provdb_index::testdb::{generate, sample_archive, SampleNodes, ORIGIN_ONE_URL, ORIGIN_TWO_URL};

use provdb_query::{FieldSelection, QueryEngine};

struct Fixture {
    _dir: tempfile::TempDir,
    graph: Arc<MemoryGraph>,
    nodes: SampleNodes,
    engine: QueryEngine,
}

fn fixture() -> Fixture {
    let dir = tempfile::TempDir::new().unwrap();
    let config = BuildConfig {
        workers: 2,
        buckets: 4,
        node_filter: NodeFilter::Heads,
    };
    generate(dir.path(), &config).unwrap();

    let (data, nodes) = sample_archive();
    let graph = Arc::new(MemoryGraph::from_data(data).unwrap());
    let store: Arc<dyn TableStore> = Arc::new(LocalFsStore::new(dir.path()).unwrap());
    let settings = Settings {
        workers: 2,
        ..Settings::default()
    };
    let engine = QueryEngine::open(
        store,
        Arc::clone(&graph) as Arc<dyn GraphSource>,
        settings,
        Metrics::disabled(),
    )
    .unwrap();

    Fixture {
        _dir: dir,
        graph,
        nodes,
        engine,
    }
}

fn swhid_of(graph: &MemoryGraph, node: NodeId) -> String {
    graph.swhid(node).unwrap().to_string()
}

/// The old revision wins over the frontier-anchored newer revision and the
/// release: its committer date is the smallest.
#[test]
fn test_shared_root_prefers_oldest_anchor() {
    let f = fixture();
    let result = f
        .engine
        .where_is_one(&swhid_of(&f.graph, f.nodes.c_shared), &FieldSelection::all())
        .unwrap();
    assert_eq!(result.anchor, Some(swhid_of(&f.graph, f.nodes.r_old)));
    assert_eq!(result.origin, Some(ORIGIN_ONE_URL.to_string()));
}

/// A content duplicated inside one revision resolves to that revision; both
/// paths collapse onto the same anchor and origin.
#[test]
fn test_duplicated_content_resolves() {
    let f = fixture();
    let result = f
        .engine
        .where_is_one(&swhid_of(&f.graph, f.nodes.c_dup), &FieldSelection::all())
        .unwrap();
    assert_eq!(result.anchor, Some(swhid_of(&f.graph, f.nodes.r_dup)));
    assert_eq!(result.origin, Some(ORIGIN_TWO_URL.to_string()));
}

/// A content whose only containing revision has no committer date is still
/// found through the direct branch.
#[test]
fn test_undated_revision_still_anchors() {
    let f = fixture();
    let result = f
        .engine
        .where_is_one(&swhid_of(&f.graph, f.nodes.c_dangling), &FieldSelection::all())
        .unwrap();
    assert_eq!(result.anchor, Some(swhid_of(&f.graph, f.nodes.r_undated)));
    assert_eq!(result.origin, Some(ORIGIN_TWO_URL.to_string()));
}

/// Frontier directories are themselves queryable artifacts.
#[test]
fn test_directory_query_through_frontier_rows() {
    let f = fixture();
    let result = f
        .engine
        .where_is_one(&swhid_of(&f.graph, f.nodes.d_root), &FieldSelection::all())
        .unwrap();
    // anchored by r_new (t=20) and the release (t=40); the older wins
    assert_eq!(result.anchor, Some(swhid_of(&f.graph, f.nodes.r_new)));
    assert_eq!(result.origin, Some(ORIGIN_ONE_URL.to_string()));
}

/// A field mask of `swhid,anchor` suppresses the origin.
#[test]
fn test_field_mask_suppresses_origin() {
    let f = fixture();
    let fields = FieldSelection::from_mask("swhid,anchor").unwrap();
    let swhid = swhid_of(&f.graph, f.nodes.c_shared);
    let result = f.engine.where_is_one(&swhid, &fields).unwrap();
    assert_eq!(result.swhid, swhid);
    assert!(result.anchor.is_some());
    assert_eq!(result.origin, None);
}

/// Unknown artifacts produce an empty result, not an error.
#[test]
fn test_unknown_swhid_yields_empty_result() {
    let f = fixture();
    let unknown = Swhid::new(NodeType::Content, [0xAB; 20]).to_string();
    let result = f.engine.where_is_one(&unknown, &FieldSelection::all()).unwrap();
    assert_eq!(result.swhid, unknown);
    assert_eq!(result.anchor, None);
    assert_eq!(result.origin, None);
}

/// Malformed identifiers are an input error, distinct from "not found".
#[test]
fn test_malformed_swhid_is_an_error() {
    let f = fixture();
    let result = f.engine.where_is_one("swh:1:cnt:nothex", &FieldSelection::all());
    assert!(matches!(result, Err(ProvError::InvalidSwhid(_))));
}

/// A batch of 10,000 inputs with ~5% unknown returns exactly 10,000 results
/// in order, duplicates included, none dropped.
#[test]
fn test_large_batch_drops_nothing() {
    let f = fixture();
    let known = [
        swhid_of(&f.graph, f.nodes.c_shared),
        swhid_of(&f.graph, f.nodes.c_dup),
        swhid_of(&f.graph, f.nodes.c_dangling),
    ];
    let mut inputs = Vec::with_capacity(10_000);
    for i in 0..10_000u32 {
        if i % 20 == 0 {
            let mut hash = [0u8; 20];
            hash[..4].copy_from_slice(&i.to_be_bytes());
            inputs.push(Swhid::new(NodeType::Content, hash).to_string());
        } else {
            inputs.push(known[i as usize % known.len()].clone());
        }
    }

    let results = f.engine.where_are_one(&inputs, &FieldSelection::all());
    assert_eq!(results.len(), 10_000);

    let mut empty = 0;
    for (input, result) in inputs.iter().zip(&results) {
        let result = result.as_ref().unwrap();
        assert_eq!(&result.swhid, input);
        if result.anchor.is_none() {
            assert!(result.origin.is_none());
            empty += 1;
        }
    }
    assert_eq!(empty, 500);
}

/// Corrupted sidecars surface once as INTERNAL-class errors, then the
/// offending files are quarantined and later queries proceed without them.
#[test]
fn test_corrupt_sidecar_quarantined_after_first_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = BuildConfig {
        workers: 2,
        buckets: 2,
        node_filter: NodeFilter::Heads,
    };
    generate(dir.path(), &config).unwrap();

    let store = LocalFsStore::new(dir.path()).unwrap();
    for key in store.list("contents_in_revisions_without_frontiers").unwrap() {
        if key.ends_with(".ef") {
            let mut bytes = store.read(&key).unwrap().to_vec();
            let mid = bytes.len() / 2;
            bytes[mid] ^= 0xFF;
            store.write(&key, &bytes).unwrap();
        }
    }

    let (data, nodes) = sample_archive();
    let graph = Arc::new(MemoryGraph::from_data(data).unwrap());
    let engine = QueryEngine::open(
        Arc::new(LocalFsStore::new(dir.path()).unwrap()),
        Arc::clone(&graph) as Arc<dyn GraphSource>,
        Settings { workers: 2, ..Settings::default() },
        Metrics::disabled(),
    )
    .unwrap();

    let swhid = graph.swhid(nodes.c_shared).unwrap().to_string();
    let first = engine.where_is_one(&swhid, &FieldSelection::all());
    assert!(matches!(first, Err(ProvError::Corruption { .. })));

    // the direct branch is quarantined; the frontier branch still answers
    let second = engine.where_is_one(&swhid, &FieldSelection::all()).unwrap();
    assert_eq!(second.anchor, Some(graph.swhid(nodes.r_new).unwrap().to_string()));
}

/// SWHID to node id and back through the `nodes` table is the identity.
#[test]
fn test_nodes_table_round_trip() {
    use provdb_query::caches::Caches;
    use provdb_query::part::LookupCtx;
    use provdb_query::table::NodesReader;

    let dir = tempfile::TempDir::new().unwrap();
    let config = BuildConfig {
        workers: 2,
        buckets: 4,
        node_filter: NodeFilter::Heads,
    };
    generate(dir.path(), &config).unwrap();
    let (data, _) = sample_archive();
    let graph = MemoryGraph::from_data(data).unwrap();

    let store: Arc<dyn TableStore> = Arc::new(LocalFsStore::new(dir.path()).unwrap());
    let reader = NodesReader::open(store, "nodes").unwrap();
    let caches = Caches::new(&Settings::default());
    let metrics = Metrics::disabled();
    let deadline = provdb_core::deadline::Deadline::unbounded();
    let ctx = LookupCtx {
        caches: &caches,
        metrics: &metrics,
        deadline: &deadline,
    };
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

    let all_ids: Vec<u64> = (0..graph.num_nodes()).collect();
    let id_to_swhid = reader.swhids_for_node_ids(&all_ids, &ctx, &pool).unwrap();
    assert_eq!(id_to_swhid.len(), all_ids.len());

    let swhids: Vec<_> = id_to_swhid.values().copied().collect();
    let swhid_to_id = reader.node_ids_for_swhids(&swhids, &ctx, &pool).unwrap();
    for (&id, swhid) in &id_to_swhid {
        assert_eq!(swhid_to_id.get(swhid), Some(&id));
        assert_eq!(graph.swhid(id), Some(*swhid));
    }
}

/// Reloading the table set is a pointer flip; queries keep working.
#[test]
fn test_reload_tables() {
    let f = fixture();
    f.engine.reload_tables().unwrap();
    let result = f
        .engine
        .where_is_one(&swhid_of(&f.graph, f.nodes.c_shared), &FieldSelection::all())
        .unwrap();
    assert!(result.anchor.is_some());
}
