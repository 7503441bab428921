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

//! Byte-range access to one columnar file
//!
//! Bridges the [`TableStore`] to the Parquet reader's `ChunkReader`
//! interface. Every fetched range (footer, dictionary, data pages) flows
//! through the shared range cache, so hot parts of hot files are read from
//! storage once.

use bytes::{Buf, Bytes};
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, Length};
use std::sync::Arc;

use provdb_core::error::Result;
use provdb_core::metrics::{keys, Metrics};
use provdb_core::store::TableStore;

use crate::caches::{ByteCache, RangeKey};

#[derive(Clone)]
pub struct StoreChunkReader {
    store: Arc<dyn TableStore>,
    key: String,
    size: u64,
    ranges: Arc<ByteCache<RangeKey, Bytes>>,
    metrics: Metrics,
}

impl StoreChunkReader {
    pub fn new(
        store: Arc<dyn TableStore>,
        key: String,
        size: u64,
        ranges: Arc<ByteCache<RangeKey, Bytes>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            key,
            size,
            ranges,
            metrics,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self, offset: u64, length: usize) -> Result<Bytes> {
        let cache_key = (self.key.clone(), offset, length as u64);
        if let Some(cached) = self.ranges.get(&cache_key) {
            self.metrics.incr(keys::CACHE_HITS);
            return Ok(cached.as_ref().clone());
        }
        self.metrics.incr(keys::CACHE_MISSES);
        let data = self.store.read_range(&self.key, offset, length)?;
        self.ranges
            .insert(cache_key, Arc::new(data.clone()), length as u64);
        Ok(data)
    }
}

impl Length for StoreChunkReader {
    fn len(&self) -> u64 {
        self.size
    }
}

impl ChunkReader for StoreChunkReader {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        let length = (self.size.saturating_sub(start)) as usize;
        Ok(self.get_bytes(start, length)?.reader())
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.fetch(start, length)
            .map_err(|e| ParquetError::External(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provdb_core::store::LocalFsStore;
    use tempfile::TempDir;

    fn reader(dir: &TempDir, payload: &[u8]) -> StoreChunkReader {
        let store = LocalFsStore::new(dir.path()).unwrap();
        store.write("t/f.parquet", payload).unwrap();
        StoreChunkReader::new(
            Arc::new(store),
            "t/f.parquet".to_string(),
            payload.len() as u64,
            Arc::new(ByteCache::new(1 << 20)),
            Metrics::disabled(),
        )
    }

    #[test]
    fn test_ranges_are_cached() {
        let dir = TempDir::new().unwrap();
        let chunk = reader(&dir, b"0123456789");

        assert_eq!(chunk.get_bytes(2, 4).unwrap().as_ref(), b"2345");
        assert_eq!(chunk.get_bytes(2, 4).unwrap().as_ref(), b"2345");
        assert_eq!(chunk.ranges.stats().hits.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_get_read_covers_tail() {
        let dir = TempDir::new().unwrap();
        let chunk = reader(&dir, b"abcdef");
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut chunk.get_read(4).unwrap(), &mut buf).unwrap();
        assert_eq!(buf, b"ef");
    }
}
