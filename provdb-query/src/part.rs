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

//! Point lookups against one part file
//!
//! The narrowing sequence for a key set: the Elias-Fano sidecar rules the
//! whole file in or out without touching it; row-group min/max statistics
//! rule out row groups; the page index rules out pages; finally a row filter
//! keeps only exact key matches in the decoded pages. Because parts are
//! hash-partitioned on the primary key, the sidecar eliminates most files at
//! the first step.

use std::ops::Range;
use std::sync::Arc;

use arrow::array::{Array, AsArray, BooleanArray, RecordBatch};
use arrow::datatypes::UInt64Type;
use arrow::error::ArrowError;
use parquet::arrow::arrow_reader::statistics::StatisticsConverter;
use parquet::arrow::arrow_reader::{
    ArrowPredicateFn, ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
    RowFilter, RowSelection,
};
use parquet::arrow::ProjectionMask;
use parquet::file::metadata::ParquetMetaData;

use provdb_core::deadline::Deadline;
use provdb_core::ef::EliasFano;
use provdb_core::error::{ProvError, Result};
use provdb_core::metrics::{keys, Metrics};
use provdb_core::store::TableStore;

use crate::caches::Caches;
use crate::chunk::StoreChunkReader;

/// Shared lookup environment threaded through every probe.
#[derive(Clone, Copy)]
pub struct LookupCtx<'a> {
    pub caches: &'a Caches,
    pub metrics: &'a Metrics,
    pub deadline: &'a Deadline,
}

pub struct PartFile {
    store: Arc<dyn TableStore>,
    parquet_key: String,
    sidecar_key: String,
    size: u64,
}

impl PartFile {
    pub fn open(store: Arc<dyn TableStore>, parquet_key: String) -> Result<Self> {
        let size = store.size(&parquet_key)?;
        let stem = parquet_key.strip_suffix(".parquet").ok_or_else(|| {
            ProvError::Internal(format!("not a parquet part file: {parquet_key}"))
        })?;
        let sidecar_key = format!("{stem}.ef");
        Ok(Self {
            store,
            parquet_key,
            sidecar_key,
            size,
        })
    }

    pub fn key(&self) -> &str {
        &self.parquet_key
    }

    fn chunk_reader(&self, ctx: &LookupCtx<'_>) -> StoreChunkReader {
        StoreChunkReader::new(
            Arc::clone(&self.store),
            self.parquet_key.clone(),
            self.size,
            // the bundle outlives every lookup; cloning the Arc'd cache here
            // keeps StoreChunkReader self-contained
            Arc::clone(&ctx.caches.shared_ranges()),
            ctx.metrics.clone(),
        )
    }

    /// The distinct primary keys present in this file.
    pub fn sidecar(&self, ctx: &LookupCtx<'_>) -> Result<Arc<EliasFano>> {
        ctx.caches.sidecars.get_or_try_insert(&self.sidecar_key, || {
            let bytes = self.store.read(&self.sidecar_key)?;
            let sidecar = EliasFano::from_bytes(&bytes, &self.sidecar_key)?;
            let weight = sidecar.heap_size() as u64;
            Ok((Arc::new(sidecar), weight))
        })
    }

    /// Cached footer, page index included.
    fn metadata(&self, ctx: &LookupCtx<'_>, chunk: &StoreChunkReader) -> Result<ArrowReaderMetadata> {
        let cached = ctx.caches.footers.get_or_try_insert(&self.parquet_key, || {
            let options = ArrowReaderOptions::new().with_page_index(true);
            let metadata = ArrowReaderMetadata::load(chunk, options).map_err(|e| {
                ProvError::corruption(&self.parquet_key, format!("cannot read footer: {e}"))
            })?;
            let weight = metadata.metadata().memory_size() as u64;
            Ok((Arc::new(metadata), weight))
        })?;
        Ok(cached.as_ref().clone())
    }

    /// Returns all rows whose `key_column` value is in `wanted`.
    ///
    /// `wanted` must be sorted ascending and deduplicated.
    pub fn point_lookup(
        &self,
        key_column: &str,
        wanted: &[u64],
        ctx: &LookupCtx<'_>,
    ) -> Result<Vec<RecordBatch>> {
        debug_assert!(wanted.windows(2).all(|w| w[0] < w[1]));
        ctx.deadline.check()?;

        let sidecar = self.sidecar(ctx)?;
        let present: Vec<u64> = wanted.iter().copied().filter(|k| sidecar.contains(*k)).collect();
        if present.is_empty() {
            ctx.metrics.incr(keys::FILES_PRUNED_BY_EF);
            return Ok(Vec::new());
        }

        let chunk = self.chunk_reader(ctx);
        let metadata = self.metadata(ctx, &chunk)?;
        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(chunk, metadata);

        let parquet_meta = Arc::clone(builder.metadata());
        let arrow_schema = Arc::clone(builder.schema());
        let key_idx = arrow_schema.index_of(key_column).map_err(|_| {
            ProvError::corruption(&self.parquet_key, format!("missing column {key_column}"))
        })?;

        let corrupt =
            |details: String| ProvError::corruption(&self.parquet_key, details);

        let (selected, row_selection) = {
            let converter =
                StatisticsConverter::try_new(key_column, &arrow_schema, builder.parquet_schema())
                    .map_err(|e| corrupt(format!("cannot read statistics: {e}")))?;

            let mins = converter
                .row_group_mins(parquet_meta.row_groups())
                .map_err(|e| corrupt(format!("cannot read row group minima: {e}")))?;
            let maxes = converter
                .row_group_maxes(parquet_meta.row_groups())
                .map_err(|e| corrupt(format!("cannot read row group maxima: {e}")))?;
            let mins = mins.as_primitive_opt::<UInt64Type>();
            let maxes = maxes.as_primitive_opt::<UInt64Type>();

            let mut selected = Vec::new();
            let mut skipped = 0u64;
            for row_group in 0..parquet_meta.num_row_groups() {
                let may_contain = match (mins, maxes) {
                    (Some(mins), Some(maxes))
                        if !mins.is_null(row_group) && !maxes.is_null(row_group) =>
                    {
                        overlaps(&present, mins.value(row_group), maxes.value(row_group))
                    }
                    // without statistics the row group cannot be ruled out
                    _ => true,
                };
                if may_contain {
                    selected.push(row_group);
                } else {
                    skipped += 1;
                }
            }
            ctx.metrics.count(keys::ROW_GROUPS_SKIPPED, skipped);
            if selected.is_empty() {
                return Ok(Vec::new());
            }

            let row_selection =
                page_selection(&parquet_meta, &converter, key_idx, &selected, &present)
                    .map_err(|e| corrupt(format!("cannot evaluate page index: {e}")))?;
            (selected, row_selection)
        };

        let filter_mask = ProjectionMask::roots(builder.parquet_schema(), [key_idx]);
        let wanted = Arc::new(present);
        let predicate = ArrowPredicateFn::new(filter_mask, move |batch: RecordBatch| {
            let column = batch.column(0).as_primitive_opt::<UInt64Type>().ok_or_else(|| {
                ArrowError::SchemaError("primary key column is not u64".to_string())
            })?;
            Ok(column
                .iter()
                .map(|value| value.map(|value| wanted.binary_search(&value).is_ok()))
                .collect::<BooleanArray>())
        });

        ctx.deadline.check()?;
        let mut builder = builder.with_row_groups(selected);
        if let Some(row_selection) = row_selection {
            builder = builder.with_row_selection(row_selection);
        }
        let reader = builder
            .with_row_filter(RowFilter::new(vec![Box::new(predicate)]))
            .build()
            .map_err(|e| corrupt(format!("cannot build reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            ctx.deadline.check()?;
            let batch = batch.map_err(|e| corrupt(format!("cannot decode page: {e}")))?;
            if batch.num_rows() > 0 {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    /// Full scan keeping rows whose fixed-size binary `column` equals one of
    /// `needles` (sorted). Used for the reverse direction on the `nodes`
    /// table, whose sort and sidecars follow node id, not SWHID.
    pub fn scan_binary_equals(
        &self,
        column: &str,
        needles: Arc<Vec<Vec<u8>>>,
        ctx: &LookupCtx<'_>,
    ) -> Result<Vec<RecordBatch>> {
        debug_assert!(needles.windows(2).all(|w| w[0] < w[1]));
        ctx.deadline.check()?;

        let chunk = self.chunk_reader(ctx);
        let metadata = self.metadata(ctx, &chunk)?;
        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(chunk, metadata);
        let column_idx = builder.schema().index_of(column).map_err(|_| {
            ProvError::corruption(&self.parquet_key, format!("missing column {column}"))
        })?;
        let corrupt = |details: String| ProvError::corruption(&self.parquet_key, details);

        let filter_mask = ProjectionMask::roots(builder.parquet_schema(), [column_idx]);
        let predicate = ArrowPredicateFn::new(filter_mask, move |batch: RecordBatch| {
            let column = batch.column(0).as_fixed_size_binary_opt().ok_or_else(|| {
                ArrowError::SchemaError("column is not fixed-size binary".to_string())
            })?;
            Ok(column
                .iter()
                .map(|value| {
                    value.map(|value| {
                        needles.binary_search_by(|n| n.as_slice().cmp(value)).is_ok()
                    })
                })
                .collect::<BooleanArray>())
        });

        let reader = builder
            .with_row_filter(RowFilter::new(vec![Box::new(predicate)]))
            .build()
            .map_err(|e| corrupt(format!("cannot build reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            ctx.deadline.check()?;
            let batch = batch.map_err(|e| corrupt(format!("cannot decode page: {e}")))?;
            if batch.num_rows() > 0 {
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}

/// Any of the sorted `wanted` keys within `[min, max]`?
fn overlaps(wanted: &[u64], min: u64, max: u64) -> bool {
    let idx = wanted.partition_point(|&k| k < min);
    idx < wanted.len() && wanted[idx] <= max
}

/// Builds a row selection covering only pages whose min/max range may hold a
/// wanted key. Returns `None` when the file carries no page index.
fn page_selection(
    meta: &ParquetMetaData,
    converter: &StatisticsConverter<'_>,
    key_idx: usize,
    selected: &[usize],
    wanted: &[u64],
) -> std::result::Result<Option<RowSelection>, ArrowError> {
    let (Some(column_index), Some(offset_index)) = (meta.column_index(), meta.offset_index())
    else {
        return Ok(None);
    };

    let page_mins = converter.data_page_mins(column_index, offset_index, selected)?;
    let page_maxes = converter.data_page_maxes(column_index, offset_index, selected)?;
    let (Some(page_mins), Some(page_maxes)) = (
        page_mins.as_primitive_opt::<UInt64Type>(),
        page_maxes.as_primitive_opt::<UInt64Type>(),
    ) else {
        return Ok(None);
    };

    let mut ranges: Vec<Range<usize>> = Vec::new();
    let mut first_row = 0usize;
    let mut page_cursor = 0usize;
    for &row_group in selected {
        let group_rows = meta.row_group(row_group).num_rows() as usize;
        let locations = offset_index[row_group][key_idx].page_locations();
        for (page, location) in locations.iter().enumerate() {
            let stats_idx = page_cursor + page;
            let may_contain = if page_mins.is_null(stats_idx) || page_maxes.is_null(stats_idx) {
                true
            } else {
                overlaps(wanted, page_mins.value(stats_idx), page_maxes.value(stats_idx))
            };
            if may_contain {
                let start = location.first_row_index as usize;
                let end = locations
                    .get(page + 1)
                    .map(|next| next.first_row_index as usize)
                    .unwrap_or(group_rows);
                ranges.push(first_row + start..first_row + end);
            }
        }
        page_cursor += locations.len();
        first_row += group_rows;
    }

    Ok(Some(RowSelection::from_consecutive_ranges(
        ranges.into_iter(),
        first_row,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        assert!(overlaps(&[5, 10, 20], 0, 5));
        assert!(overlaps(&[5, 10, 20], 11, 25));
        assert!(!overlaps(&[5, 10, 20], 11, 19));
        assert!(!overlaps(&[5, 10, 20], 21, 100));
        assert!(!overlaps(&[], 0, u64::MAX));
    }
}
