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

//! Archive graph access
//!
//! The builder and the query engine both see the archive through
//! [`GraphSource`]: dense node ids, typed successor/predecessor iteration,
//! per-anchor dates, and origin resolution. Node ids are only meaningful
//! within one snapshot; every table set records the snapshot id it was built
//! against.
//!
//! [`MemoryGraph`] is the in-process implementation, loadable from a JSON
//! snapshot file. It backs tests, `gen-test-database`, and deployments small
//! enough to hold the graph in memory; a remote graph service would implement
//! the same trait.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProvError, Result};
use crate::swhid::{NodeType, Swhid};

/// Dense node identifier, valid within one graph snapshot.
pub type NodeId = u64;

/// A named directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub target: NodeId,
}

/// Read access to one snapshot of the archive graph.
pub trait GraphSource: Send + Sync {
    /// Identifier of the snapshot this graph was taken from.
    fn snapshot_id(&self) -> &str;

    fn num_nodes(&self) -> u64;

    fn node_id(&self, swhid: &Swhid) -> Option<NodeId>;

    fn swhid(&self, node: NodeId) -> Option<Swhid>;

    fn node_type(&self, node: NodeId) -> Option<NodeType>;

    /// Outgoing edges, any type.
    fn successors(&self, node: NodeId) -> Vec<NodeId>;

    /// Incoming edges, any type.
    fn predecessors(&self, node: NodeId) -> Vec<NodeId>;

    /// Named entries of a directory, sorted by name bytes.
    fn directory_entries(&self, dir: NodeId) -> Vec<DirEntry>;

    /// Committer date of a revision or release, seconds since the epoch.
    fn committer_date(&self, node: NodeId) -> Option<i64>;

    /// Root directory of a revision, or of a release's target chain.
    fn root_directory(&self, revrel: NodeId) -> Option<NodeId>;

    /// URL of an origin node.
    fn origin_url(&self, node: NodeId) -> Option<String>;

    /// An origin whose snapshots transitively reach the given anchor.
    ///
    /// Deterministic: when several origins qualify, the lexicographically
    /// smallest URL is returned.
    fn origin_for_anchor(&self, revrel: NodeId) -> Option<(NodeId, String)> {
        let mut stack = vec![revrel];
        let mut seen = std::collections::HashSet::new();
        seen.insert(revrel);
        let mut best: Option<(NodeId, String)> = None;
        while let Some(node) = stack.pop() {
            for pred in self.predecessors(node) {
                if !seen.insert(pred) {
                    continue;
                }
                match self.node_type(pred) {
                    Some(NodeType::Origin) => {
                        if let Some(url) = self.origin_url(pred) {
                            let better = match &best {
                                Some((_, current)) => url < *current,
                                None => true,
                            };
                            if better {
                                best = Some((pred, url));
                            }
                        }
                    }
                    Some(NodeType::Revision | NodeType::Release | NodeType::Snapshot) => {
                        stack.push(pred);
                    }
                    _ => {}
                }
            }
        }
        best
    }
}

// =============================================================================
// Serialized snapshot format
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeData {
    pub swhid: Swhid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgeData {
    pub src: NodeId,
    pub dst: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Vec<u8>>,
}

/// On-disk form of a graph snapshot: nodes in node-id order plus typed edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub snapshot_id: String,
    pub nodes: Vec<GraphNodeData>,
    pub edges: Vec<GraphEdgeData>,
}

// =============================================================================
// In-memory implementation
// =============================================================================

pub struct MemoryGraph {
    snapshot_id: String,
    swhids: Vec<Swhid>,
    dates: Vec<Option<i64>>,
    urls: HashMap<NodeId, String>,
    successors: Vec<Vec<(Option<Vec<u8>>, NodeId)>>,
    predecessors: Vec<Vec<NodeId>>,
    by_swhid: HashMap<Swhid, NodeId>,
}

impl MemoryGraph {
    pub fn from_data(data: GraphData) -> Result<Self> {
        let n = data.nodes.len();
        let mut swhids = Vec::with_capacity(n);
        let mut dates = Vec::with_capacity(n);
        let mut urls = HashMap::new();
        let mut by_swhid = HashMap::with_capacity(n);
        for (id, node) in data.nodes.into_iter().enumerate() {
            if by_swhid.insert(node.swhid, id as NodeId).is_some() {
                return Err(ProvError::IncompleteInput(format!(
                    "duplicate SWHID in graph snapshot: {}",
                    node.swhid
                )));
            }
            if let Some(url) = node.url {
                urls.insert(id as NodeId, url);
            }
            swhids.push(node.swhid);
            dates.push(node.date);
        }

        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        for edge in data.edges {
            if edge.src as usize >= n || edge.dst as usize >= n {
                return Err(ProvError::IncompleteInput(format!(
                    "edge {} -> {} out of range for {} nodes",
                    edge.src, edge.dst, n
                )));
            }
            successors[edge.src as usize].push((edge.name, edge.dst));
            predecessors[edge.dst as usize].push(edge.src);
        }
        for succ in &mut successors {
            succ.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        for pred in &mut predecessors {
            pred.sort_unstable();
        }

        Ok(Self {
            snapshot_id: data.snapshot_id,
            swhids,
            dates,
            urls,
            successors,
            predecessors,
            by_swhid,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        let data: GraphData = serde_json::from_slice(&raw).map_err(|e| {
            ProvError::IncompleteInput(format!("cannot parse graph snapshot {}: {e}", path.display()))
        })?;
        Self::from_data(data)
    }
}

impl GraphSource for MemoryGraph {
    fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    fn num_nodes(&self) -> u64 {
        self.swhids.len() as u64
    }

    fn node_id(&self, swhid: &Swhid) -> Option<NodeId> {
        self.by_swhid.get(swhid).copied()
    }

    fn swhid(&self, node: NodeId) -> Option<Swhid> {
        self.swhids.get(node as usize).copied()
    }

    fn node_type(&self, node: NodeId) -> Option<NodeType> {
        self.swhids.get(node as usize).map(|s| s.node_type)
    }

    fn successors(&self, node: NodeId) -> Vec<NodeId> {
        self.successors
            .get(node as usize)
            .map(|succ| succ.iter().map(|(_, dst)| *dst).collect())
            .unwrap_or_default()
    }

    fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.predecessors.get(node as usize).cloned().unwrap_or_default()
    }

    fn directory_entries(&self, dir: NodeId) -> Vec<DirEntry> {
        let Some(succ) = self.successors.get(dir as usize) else {
            return Vec::new();
        };
        succ.iter()
            .filter_map(|(name, target)| {
                name.as_ref().map(|name| DirEntry {
                    name: name.clone(),
                    target: *target,
                })
            })
            .collect()
    }

    fn committer_date(&self, node: NodeId) -> Option<i64> {
        self.dates.get(node as usize).copied().flatten()
    }

    fn root_directory(&self, revrel: NodeId) -> Option<NodeId> {
        match self.node_type(revrel)? {
            NodeType::Directory => Some(revrel),
            NodeType::Revision | NodeType::Release => {
                // a release may target another release, a revision, or a
                // directory; the chain is acyclic by construction
                let succ = self.successors(revrel);
                for target in &succ {
                    if self.node_type(*target) == Some(NodeType::Directory) {
                        return Some(*target);
                    }
                }
                for target in &succ {
                    if matches!(
                        self.node_type(*target),
                        Some(NodeType::Revision | NodeType::Release)
                    ) {
                        if let Some(root) = self.root_directory(*target) {
                            return Some(root);
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn origin_url(&self, node: NodeId) -> Option<String> {
        self.urls.get(&node).cloned()
    }
}

// =============================================================================
// Snapshot construction
// =============================================================================

/// Incremental construction of a [`GraphData`] snapshot, used by fixtures and
/// the test-database generator. Hashes are derived deterministically from the
/// snapshot id and a per-node counter, so repeated builds are identical.
pub struct GraphBuilder {
    data: GraphData,
}

impl GraphBuilder {
    pub fn new(snapshot_id: impl Into<String>) -> Self {
        Self {
            data: GraphData {
                snapshot_id: snapshot_id.into(),
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    fn add(&mut self, node_type: NodeType, date: Option<i64>, url: Option<String>) -> NodeId {
        let id = self.data.nodes.len() as NodeId;
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.data.snapshot_id.as_bytes());
        hasher.update(&[node_type.code()]);
        hasher.update(&id.to_le_bytes());
        let digest = hasher.finalize();
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest.as_bytes()[..20]);
        self.data.nodes.push(GraphNodeData {
            swhid: Swhid::new(node_type, hash),
            date,
            url,
        });
        id
    }

    pub fn content(&mut self) -> NodeId {
        self.add(NodeType::Content, None, None)
    }

    pub fn directory(&mut self) -> NodeId {
        self.add(NodeType::Directory, None, None)
    }

    pub fn revision(&mut self, date: Option<i64>) -> NodeId {
        self.add(NodeType::Revision, date, None)
    }

    pub fn release(&mut self, date: Option<i64>) -> NodeId {
        self.add(NodeType::Release, date, None)
    }

    pub fn snapshot(&mut self) -> NodeId {
        self.add(NodeType::Snapshot, None, None)
    }

    pub fn origin(&mut self, url: impl Into<String>) -> NodeId {
        self.add(NodeType::Origin, None, Some(url.into()))
    }

    /// Adds a named directory entry.
    pub fn entry(&mut self, dir: NodeId, name: &[u8], target: NodeId) {
        self.data.edges.push(GraphEdgeData {
            src: dir,
            dst: target,
            name: Some(name.to_vec()),
        });
    }

    /// Adds an unnamed edge (revision parent, snapshot branch, origin visit).
    pub fn edge(&mut self, src: NodeId, dst: NodeId) {
        self.data.edges.push(GraphEdgeData {
            src,
            dst,
            name: None,
        });
    }

    pub fn into_data(self) -> GraphData {
        self.data
    }

    pub fn build(self) -> Result<MemoryGraph> {
        MemoryGraph::from_data(self.data)
    }
}
