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

//! On-disk layout of a table set
//!
//! A database directory holds, per table, `part-NNNNN.parquet` files
//! row-sorted by primary key with a `part-NNNNN.ef` sidecar each, plus a
//! `_SUCCESS` marker. Builder intermediates (the two dense timestamp arrays)
//! and the `MANIFEST.json` binding the table set to its graph snapshot live
//! at the directory root.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use serde::{Deserialize, Serialize};

use provdb_core::swhid::ENCODED_LEN;

pub const TABLE_NODES: &str = "nodes";
pub const TABLE_FDIR: &str = "frontier_directories_in_revisions";
pub const TABLE_CFD: &str = "contents_in_frontier_directories";
pub const TABLE_CRNF: &str = "contents_in_revisions_without_frontiers";
pub const TABLE_FRONTIER_SET: &str = "frontier_directories";

pub const EARLIEST_TIMESTAMPS_FILE: &str = "earliest_timestamps.bin";
pub const MAX_LEAF_TIMESTAMPS_FILE: &str = "directory_max_leaf_timestamps.bin";
pub const MANIFEST_FILE: &str = "MANIFEST.json";

pub fn part_file(table: &str, bucket: usize) -> String {
    format!("{table}/part-{bucket:05}.parquet")
}

pub fn sidecar_file(table: &str, bucket: usize) -> String {
    format!("{table}/part-{bucket:05}.ef")
}

pub fn part_name(bucket: usize) -> String {
    format!("part-{bucket:05}.parquet")
}

pub fn sidecar_name(bucket: usize) -> String {
    format!("part-{bucket:05}.ef")
}

/// Binds a table set to the graph snapshot it was built against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub snapshot_id: String,
    pub buckets: usize,
    pub node_filter: String,
    pub tables: Vec<String>,
}

pub fn nodes_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("node_id", DataType::UInt64, false),
        Field::new("swhid", DataType::FixedSizeBinary(ENCODED_LEN as i32), false),
    ]))
}

pub fn fdir_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("frontier_dir", DataType::UInt64, false),
        Field::new("revision", DataType::UInt64, false),
        Field::new("path", DataType::Binary, false),
    ]))
}

pub fn cfd_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("content", DataType::UInt64, false),
        Field::new("frontier_dir", DataType::UInt64, false),
        Field::new("path", DataType::Binary, false),
    ]))
}

pub fn crnf_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("content", DataType::UInt64, false),
        Field::new("revision", DataType::UInt64, false),
        Field::new("path", DataType::Binary, false),
    ]))
}

pub fn frontier_set_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new(
        "frontier_dir",
        DataType::UInt64,
        false,
    )]))
}

/// Shared writer configuration: zstd everywhere, page-level statistics so the
/// reader can prune row groups and pages, row groups kept small enough that a
/// point query decodes little.
pub fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_max_row_group_size(64 * 1024)
        .set_data_page_row_count_limit(4 * 1024)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_naming() {
        assert_eq!(part_file("nodes", 3), "nodes/part-00003.parquet");
        assert_eq!(sidecar_file("nodes", 3), "nodes/part-00003.ef");
    }

    #[test]
    fn test_manifest_round_trip() {
        let manifest = Manifest {
            snapshot_id: "snap-1".into(),
            buckets: 8,
            node_filter: "heads".into(),
            tables: vec![TABLE_NODES.into(), TABLE_CRNF.into()],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.snapshot_id, "snap-1");
        assert_eq!(parsed.buckets, 8);
    }
}
