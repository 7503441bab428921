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

//! Table readers
//!
//! A table is a set of part files probed in parallel on the shared executor.
//! A part that fails a corruption check is reported once and then quarantined
//! for the rest of the process lifetime; later lookups skip it.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::UInt64Type;
use dashmap::DashSet;
use rayon::prelude::*;

use provdb_core::error::{ProvError, Result};
use provdb_core::store::{TableStore, SUCCESS_MARKER};
use provdb_core::swhid::Swhid;

use crate::part::{LookupCtx, PartFile};

/// One decoded relation row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Triple {
    pub key: u64,
    pub value: u64,
    pub path: Vec<u8>,
}

fn decode_relation_batch(batch: &RecordBatch, table: &str) -> Result<Vec<Triple>> {
    let corrupt = |what: &str| ProvError::corruption(table, format!("{what} in relation batch"));
    let keys = batch
        .column(0)
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| corrupt("key column is not u64"))?;
    let values = batch
        .column(1)
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| corrupt("value column is not u64"))?;
    let paths = batch
        .column(2)
        .as_binary_opt::<i32>()
        .ok_or_else(|| corrupt("path column is not binary"))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if keys.is_null(i) || values.is_null(i) || paths.is_null(i) {
            return Err(corrupt("null value"));
        }
        rows.push(Triple {
            key: keys.value(i),
            value: values.value(i),
            path: paths.value(i).to_vec(),
        });
    }
    Ok(rows)
}

fn decode_nodes_batch(batch: &RecordBatch, table: &str) -> Result<Vec<(u64, Swhid)>> {
    let corrupt = |what: String| ProvError::corruption(table, what);
    let ids = batch
        .column(0)
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| corrupt("node_id column is not u64".into()))?;
    let swhids = batch
        .column(1)
        .as_fixed_size_binary_opt()
        .ok_or_else(|| corrupt("swhid column is not fixed-size binary".into()))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if ids.is_null(i) || swhids.is_null(i) {
            return Err(corrupt("null value in nodes batch".into()));
        }
        let swhid = Swhid::from_bytes(swhids.value(i))
            .map_err(|e| corrupt(format!("undecodable SWHID: {e}")))?;
        rows.push((ids.value(i), swhid));
    }
    Ok(rows)
}

pub struct TableReader {
    name: String,
    key_column: &'static str,
    parts: Vec<PartFile>,
    quarantined: DashSet<String>,
}

impl TableReader {
    pub fn open(store: Arc<dyn TableStore>, name: &str, key_column: &'static str) -> Result<Self> {
        if !store.exists(&format!("{name}/{SUCCESS_MARKER}"))? {
            return Err(ProvError::IncompleteInput(format!(
                "table {name} is missing its success marker"
            )));
        }
        let parts = store
            .list(name)?
            .into_iter()
            .filter(|key| key.ends_with(".parquet"))
            .map(|key| PartFile::open(Arc::clone(&store), key))
            .collect::<Result<Vec<_>>>()?;
        if parts.is_empty() {
            tracing::warn!("table {name} has no part files");
        }
        Ok(Self {
            name: name.to_string(),
            key_column,
            parts,
            quarantined: DashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Probes every live part in parallel; quarantines parts that report
    /// corruption after surfacing the error once.
    ///
    /// Every part is probed even when one fails early, so a single pass
    /// quarantines everything bad at once.
    fn for_each_part<T: Send>(
        &self,
        pool: &rayon::ThreadPool,
        probe: impl Fn(&PartFile) -> Result<Vec<T>> + Sync,
    ) -> Result<Vec<T>> {
        let outcomes: Vec<Result<Vec<T>>> = pool.install(|| {
            self.parts
                .par_iter()
                .map(|part| {
                    if self.quarantined.contains(part.key()) {
                        tracing::debug!("skipping quarantined part {}", part.key());
                        return Ok(Vec::new());
                    }
                    match probe(part) {
                        Err(e @ ProvError::Corruption { .. }) => {
                            tracing::error!(
                                "corruption in {}; quarantining for process lifetime: {e}",
                                part.key()
                            );
                            self.quarantined.insert(part.key().to_string());
                            Err(e)
                        }
                        other => other,
                    }
                })
                .collect()
        });

        let mut rows = Vec::new();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(found) => rows.extend(found),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(rows),
        }
    }

    /// All rows whose primary key is in `keys` (sorted, deduplicated).
    pub fn lookup(
        &self,
        keys: &[u64],
        ctx: &LookupCtx<'_>,
        pool: &rayon::ThreadPool,
    ) -> Result<Vec<Triple>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.for_each_part(pool, |part| {
            let batches = part.point_lookup(self.key_column, keys, ctx)?;
            let mut rows = Vec::new();
            for batch in &batches {
                rows.extend(decode_relation_batch(batch, &self.name)?);
            }
            Ok(rows)
        })
    }
}

/// The `nodes` table supports both directions: node id to SWHID through the
/// primary-key machinery, SWHID to node id through a filtered scan.
pub struct NodesReader {
    inner: TableReader,
}

impl NodesReader {
    pub fn open(store: Arc<dyn TableStore>, name: &str) -> Result<Self> {
        Ok(Self {
            inner: TableReader::open(store, name, "node_id")?,
        })
    }

    pub fn swhids_for_node_ids(
        &self,
        ids: &[u64],
        ctx: &LookupCtx<'_>,
        pool: &rayon::ThreadPool,
    ) -> Result<HashMap<u64, Swhid>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self.inner.for_each_part(pool, |part| {
            let batches = part.point_lookup("node_id", ids, ctx)?;
            let mut rows = Vec::new();
            for batch in &batches {
                rows.extend(decode_nodes_batch(batch, self.inner.name())?);
            }
            Ok(rows)
        })?;
        Ok(rows.into_iter().collect())
    }

    pub fn node_ids_for_swhids(
        &self,
        swhids: &[Swhid],
        ctx: &LookupCtx<'_>,
        pool: &rayon::ThreadPool,
    ) -> Result<HashMap<Swhid, u64>> {
        if swhids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut needles: Vec<Vec<u8>> = swhids.iter().map(|s| s.to_bytes().to_vec()).collect();
        needles.sort_unstable();
        needles.dedup();
        let needles = Arc::new(needles);

        let rows = self.inner.for_each_part(pool, |part| {
            let batches = part.scan_binary_equals("swhid", Arc::clone(&needles), ctx)?;
            let mut rows = Vec::new();
            for batch in &batches {
                rows.extend(decode_nodes_batch(batch, self.inner.name())?);
            }
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(|(id, swhid)| (swhid, id)).collect())
    }
}
