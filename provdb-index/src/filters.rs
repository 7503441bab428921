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

//! Traversal root selection
//!
//! Builder stages start one tree walk per revision or release. `Heads`
//! restricts that to branch tips: releases, and revisions no other revision
//! lists as a parent. `All` walks everything, which is slower and only
//! changes results on archives with unreferenced history.

use std::fmt;
use std::str::FromStr;

use provdb_core::error::ProvError;
use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::swhid::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeFilter {
    #[default]
    Heads,
    All,
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeFilter::Heads => "heads",
            NodeFilter::All => "all",
        })
    }
}

impl FromStr for NodeFilter {
    type Err = ProvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heads" => Ok(NodeFilter::Heads),
            "all" => Ok(NodeFilter::All),
            other => Err(ProvError::InvalidArgument(format!(
                "unknown node filter {other:?} (expected \"heads\" or \"all\")"
            ))),
        }
    }
}

/// Whether a builder walk starts from this node.
pub fn is_traversal_root<G: GraphSource + ?Sized>(
    graph: &G,
    filter: NodeFilter,
    node: NodeId,
) -> bool {
    match graph.node_type(node) {
        Some(NodeType::Release) => true,
        Some(NodeType::Revision) => match filter {
            NodeFilter::All => true,
            NodeFilter::Heads => !graph
                .predecessors(node)
                .into_iter()
                .any(|pred| graph.node_type(pred) == Some(NodeType::Revision)),
        },
        _ => false,
    }
}
