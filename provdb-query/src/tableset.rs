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

//! One immutable table set
//!
//! Opening a table set reads the manifest, verifies it was built against the
//! same graph snapshot the engine is serving, and wires up the four readers.
//! A set is held behind an `Arc` for the duration of any query using it;
//! swapping in a rebuilt set is a pointer flip in the engine.

use std::sync::Arc;

use provdb_core::error::{ProvError, Result};
use provdb_core::store::TableStore;

use provdb_index::layout::{
    Manifest, MANIFEST_FILE, TABLE_CFD, TABLE_CRNF, TABLE_FDIR, TABLE_NODES,
};

use crate::table::{NodesReader, TableReader};

pub struct TableSet {
    pub manifest: Manifest,
    pub nodes: NodesReader,
    pub fdir: TableReader,
    pub cfd: TableReader,
    pub crnf: TableReader,
}

impl TableSet {
    pub fn open(store: Arc<dyn TableStore>, expected_snapshot: &str) -> Result<Arc<Self>> {
        if !store.exists(MANIFEST_FILE)? {
            return Err(ProvError::IncompleteInput(format!(
                "no {MANIFEST_FILE} in store; run the index pipeline first"
            )));
        }
        let manifest: Manifest =
            serde_json::from_slice(&store.read(MANIFEST_FILE)?).map_err(|e| {
                ProvError::corruption(MANIFEST_FILE, format!("cannot parse manifest: {e}"))
            })?;
        if manifest.snapshot_id != expected_snapshot {
            return Err(ProvError::IncompleteInput(format!(
                "table set was built against snapshot {:?} but the graph is {:?}",
                manifest.snapshot_id, expected_snapshot
            )));
        }

        Ok(Arc::new(Self {
            nodes: NodesReader::open(Arc::clone(&store), TABLE_NODES)?,
            fdir: TableReader::open(Arc::clone(&store), TABLE_FDIR, "frontier_dir")?,
            cfd: TableReader::open(Arc::clone(&store), TABLE_CFD, "content")?,
            crnf: TableReader::open(Arc::clone(&store), TABLE_CRNF, "content")?,
            manifest,
        }))
    }
}
