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

//! The query engine
//!
//! One explicit handle carries everything a request needs: the current table
//! set, the caches, the lookup executor, the graph, metrics, and timeouts.
//! A query moves through resolving (SWHID to node id, graph first with a
//! `nodes`-table fallback), scanning (the direct branch and the frontier
//! branch), merging (union plus the fixed tie-break), and enriching (dates,
//! anchor SWHIDs, origins). Unknown artifacts produce an empty result, not
//! an error.
//!
//! The tie-break is fixed: smallest `(earliest_date, revision_swhid,
//! origin_url, path)`; anchors without a date sort last, without an origin as
//! the empty string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rayon::prelude::*;

use provdb_core::config::Settings;
use provdb_core::deadline::Deadline;
use provdb_core::error::{ProvError, Result};
use provdb_core::graph::{GraphSource, NodeId};
use provdb_core::metrics::{keys, Metrics};
use provdb_core::path;
use provdb_core::store::TableStore;
use provdb_core::swhid::Swhid;

use crate::caches::Caches;
use crate::part::LookupCtx;
use crate::tableset::TableSet;

/// Which result fields the caller asked for, parsed from a comma list over
/// `swhid,anchor,origin`. An empty mask selects everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSelection {
    pub swhid: bool,
    pub anchor: bool,
    pub origin: bool,
}

impl FieldSelection {
    pub fn all() -> Self {
        Self {
            swhid: true,
            anchor: true,
            origin: true,
        }
    }

    pub fn from_mask(mask: &str) -> Result<Self> {
        if mask.trim().is_empty() {
            return Ok(Self::all());
        }
        let mut fields = Self {
            swhid: false,
            anchor: false,
            origin: false,
        };
        for field in mask.split(',') {
            match field.trim() {
                "swhid" => fields.swhid = true,
                "anchor" => fields.anchor = true,
                "origin" => fields.origin = true,
                other => {
                    return Err(ProvError::InvalidArgument(format!(
                        "unknown field {other:?} in mask (expected swhid, anchor, origin)"
                    )))
                }
            }
        }
        Ok(fields)
    }
}

/// One provenance answer. Both `anchor` and `origin` absent means "no known
/// provenance".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereIs {
    pub swhid: String,
    pub anchor: Option<String>,
    pub origin: Option<String>,
}

/// A candidate `(anchor, path)` pair before enrichment.
type Candidate = (NodeId, Vec<u8>);

pub struct QueryEngine {
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn TableStore>,
    tables: RwLock<Arc<TableSet>>,
    caches: Caches,
    pool: rayon::ThreadPool,
    metrics: Metrics,
    settings: Settings,
}

impl QueryEngine {
    pub fn open(
        store: Arc<dyn TableStore>,
        graph: Arc<dyn GraphSource>,
        settings: Settings,
        metrics: Metrics,
    ) -> Result<Self> {
        let tables = TableSet::open(Arc::clone(&store), graph.snapshot_id())?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.workers)
            .build()
            .map_err(|e| ProvError::Internal(format!("cannot build lookup pool: {e}")))?;
        Ok(Self {
            graph,
            store,
            tables: RwLock::new(tables),
            caches: Caches::new(&settings),
            pool,
            metrics,
            settings,
        })
    }

    /// Re-opens the table set from the store and flips the shared pointer.
    /// In-flight queries keep their `Arc` to the old set.
    pub fn reload_tables(&self) -> Result<()> {
        let fresh = TableSet::open(Arc::clone(&self.store), self.graph.snapshot_id())?;
        *self.tables.write() = fresh;
        Ok(())
    }

    fn tables(&self) -> Arc<TableSet> {
        Arc::clone(&self.tables.read())
    }

    pub fn where_is_one(&self, swhid: &str, fields: &FieldSelection) -> Result<WhereIs> {
        let deadline = Deadline::after(self.settings.request_timeout);
        self.where_is(swhid, fields, &deadline)
    }

    /// Independent per-element answers; one failure never affects siblings.
    /// Duplicated inputs produce duplicated outputs.
    pub fn where_are_one(&self, swhids: &[String], fields: &FieldSelection) -> Vec<Result<WhereIs>> {
        self.pool.install(|| {
            swhids
                .par_iter()
                .map(|swhid| {
                    let deadline = Deadline::after(self.settings.request_timeout);
                    self.where_is(swhid, fields, &deadline)
                })
                .collect()
        })
    }

    pub fn where_is(
        &self,
        swhid_str: &str,
        fields: &FieldSelection,
        deadline: &Deadline,
    ) -> Result<WhereIs> {
        let started = Instant::now();
        self.metrics.incr(keys::POINTS_LOOKED_UP);
        let swhid: Swhid = swhid_str.parse()?;
        let tables = self.tables();

        tracing::trace!(swhid = %swhid, "resolving");
        let Some(node) = self.resolve_node(&tables, &swhid, deadline)? else {
            return Ok(mask_result(swhid_str, None, None, fields));
        };

        tracing::trace!(node, "scanning");
        let candidates = self.scan(&tables, node, deadline)?;
        if candidates.is_empty() {
            return Ok(mask_result(swhid_str, None, None, fields));
        }

        tracing::trace!(candidates = candidates.len(), "merging");
        let (anchor, origin) = self.enrich_and_pick(&tables, candidates, deadline)?;

        self.metrics.time("where_is_one", started.elapsed());
        Ok(mask_result(swhid_str, anchor, origin, fields))
    }

    fn lookup_ctx<'a>(&'a self, deadline: &'a Deadline) -> LookupCtx<'a> {
        LookupCtx {
            caches: &self.caches,
            metrics: &self.metrics,
            deadline,
        }
    }

    /// SWHID to node id: the graph answers directly when it can; otherwise
    /// the `nodes` table is scanned.
    fn resolve_node(
        &self,
        tables: &TableSet,
        swhid: &Swhid,
        deadline: &Deadline,
    ) -> Result<Option<NodeId>> {
        if let Some(node) = self.graph.node_id(swhid) {
            return Ok(Some(node));
        }
        let child = deadline.child(self.settings.lookup_timeout);
        let ctx = self.lookup_ctx(&child);
        let resolved = tables.nodes.node_ids_for_swhids(&[*swhid], &ctx, &self.pool)?;
        Ok(resolved.get(swhid).copied())
    }

    /// Union of the direct branch (CRNF) and the frontier branch
    /// (CFD joined with FDIR on the frontier directory).
    fn scan(&self, tables: &TableSet, node: NodeId, deadline: &Deadline) -> Result<Vec<Candidate>> {
        let keys = [node];

        let child = deadline.child(self.settings.lookup_timeout);
        let ctx = self.lookup_ctx(&child);
        let direct = tables.crnf.lookup(&keys, &ctx, &self.pool)?;
        let mut candidates: Vec<Candidate> =
            direct.into_iter().map(|row| (row.value, row.path)).collect();

        // directories are queryable too: a frontier directory carries its own
        // anchor rows, keyed by its node id
        let child = deadline.child(self.settings.lookup_timeout);
        let ctx = self.lookup_ctx(&child);
        let as_frontier = tables.fdir.lookup(&keys, &ctx, &self.pool)?;
        candidates.extend(as_frontier.into_iter().map(|row| (row.value, row.path)));

        let child = deadline.child(self.settings.lookup_timeout);
        let ctx = self.lookup_ctx(&child);
        let in_frontier = tables.cfd.lookup(&keys, &ctx, &self.pool)?;
        if !in_frontier.is_empty() {
            let mut dirs: Vec<NodeId> = in_frontier.iter().map(|row| row.value).collect();
            dirs.sort_unstable();
            dirs.dedup();

            let child = deadline.child(self.settings.lookup_timeout);
            let ctx = self.lookup_ctx(&child);
            let anchored = tables.fdir.lookup(&dirs, &ctx, &self.pool)?;

            let mut anchors_by_dir: HashMap<NodeId, Vec<(NodeId, Vec<u8>)>> = HashMap::new();
            for row in anchored {
                anchors_by_dir.entry(row.key).or_default().push((row.value, row.path));
            }
            for row in &in_frontier {
                if let Some(anchors) = anchors_by_dir.get(&row.value) {
                    for (revision, prefix) in anchors {
                        candidates.push((*revision, path::join(prefix, &row.path)));
                    }
                }
            }
        }

        candidates.sort();
        candidates.dedup();
        Ok(candidates)
    }

    /// Fetches dates, anchor SWHIDs, and origins, then applies the fixed
    /// tie-break and returns the winning `(anchor, origin)` strings.
    fn enrich_and_pick(
        &self,
        tables: &TableSet,
        candidates: Vec<Candidate>,
        deadline: &Deadline,
    ) -> Result<(Option<String>, Option<String>)> {
        deadline.check()?;

        let mut revisions: Vec<NodeId> = candidates.iter().map(|(rev, _)| *rev).collect();
        revisions.sort_unstable();
        revisions.dedup();

        let mut anchor_swhids: HashMap<NodeId, Swhid> = HashMap::new();
        let mut missing: Vec<NodeId> = Vec::new();
        for &revision in &revisions {
            match self.graph.swhid(revision) {
                Some(swhid) => {
                    anchor_swhids.insert(revision, swhid);
                }
                None => missing.push(revision),
            }
        }
        if !missing.is_empty() {
            let child = deadline.child(self.settings.lookup_timeout);
            let ctx = self.lookup_ctx(&child);
            anchor_swhids.extend(tables.nodes.swhids_for_node_ids(&missing, &ctx, &self.pool)?);
        }

        let dates: HashMap<NodeId, Option<i64>> = revisions
            .iter()
            .map(|&rev| (rev, self.graph.committer_date(rev)))
            .collect();
        let origins: HashMap<NodeId, Option<String>> = revisions
            .iter()
            .map(|&rev| (rev, self.graph.origin_for_anchor(rev).map(|(_, url)| url)))
            .collect();

        deadline.check()?;
        let best = candidates
            .into_iter()
            .filter_map(|(revision, content_path)| {
                let Some(anchor) = anchor_swhids.get(&revision) else {
                    // a row referencing a node id absent from both the graph
                    // and the nodes table; cross-snapshot contamination
                    tracing::warn!("anchor node {revision} has no resolvable SWHID; ignoring");
                    return None;
                };
                let date = dates.get(&revision).copied().flatten().unwrap_or(i64::MAX);
                let origin = origins.get(&revision).cloned().flatten();
                let sort_key = (
                    date,
                    anchor.to_string(),
                    origin.clone().unwrap_or_default(),
                    content_path,
                );
                Some((sort_key, anchor.to_string(), origin))
            })
            .min_by(|a, b| a.0.cmp(&b.0));

        match best {
            Some((_, anchor, origin)) => Ok((Some(anchor), origin)),
            None => Err(ProvError::Internal(
                "no candidate survived anchor resolution".to_string(),
            )),
        }
    }
}

fn mask_result(
    swhid: &str,
    anchor: Option<String>,
    origin: Option<String>,
    fields: &FieldSelection,
) -> WhereIs {
    WhereIs {
        swhid: if fields.swhid { swhid.to_string() } else { String::new() },
        anchor: anchor.filter(|_| fields.anchor),
        origin: origin.filter(|_| fields.origin),
    }
}
