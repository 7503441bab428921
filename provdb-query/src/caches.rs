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

//! Byte-budgeted concurrent caches
//!
//! Three caches back the point-query protocol: parsed footers, Elias-Fano
//! sidecars, and raw fetched byte ranges. All are shared across requests,
//! bounded in bytes, and evict least-recently-used entries. A concurrent
//! double-compute on miss is accepted; both results are identical and the
//! second insert wins.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parquet::arrow::arrow_reader::ArrowReaderMetadata;

use provdb_core::config::Settings;
use provdb_core::ef::EliasFano;
use provdb_core::error::Result;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

struct CacheEntry<V> {
    value: Arc<V>,
    weight: u64,
    last_used: AtomicU64,
}

/// LRU cache bounded by the summed weight of its entries.
pub struct ByteCache<K: Eq + Hash + Clone, V> {
    entries: DashMap<K, CacheEntry<V>>,
    budget: u64,
    used: AtomicU64,
    tick: AtomicU64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> ByteCache<K, V> {
    pub fn new(budget: u64) -> Self {
        Self {
            entries: DashMap::new(),
            budget,
            used: AtomicU64::new(0),
            tick: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.entries.get(key) {
            Some(entry) => {
                entry
                    .last_used
                    .store(self.tick.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: Arc<V>, weight: u64) {
        if weight > self.budget {
            // oversized values pass through uncached
            return;
        }
        let entry = CacheEntry {
            value,
            weight,
            last_used: AtomicU64::new(self.tick.fetch_add(1, Ordering::Relaxed)),
        };
        if let Some(previous) = self.entries.insert(key, entry) {
            self.used.fetch_sub(previous.weight, Ordering::Relaxed);
        }
        self.used.fetch_add(weight, Ordering::Relaxed);
        self.evict_to_budget();
    }

    /// Looks up `key`, computing and caching the value on miss.
    pub fn get_or_try_insert(
        &self,
        key: &K,
        compute: impl FnOnce() -> Result<(Arc<V>, u64)>,
    ) -> Result<Arc<V>> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let (value, weight) = compute()?;
        self.insert(key.clone(), Arc::clone(&value), weight);
        Ok(value)
    }

    fn evict_to_budget(&self) {
        while self.used.load(Ordering::Relaxed) > self.budget {
            let mut oldest: Option<(K, u64)> = None;
            for entry in self.entries.iter() {
                let used = entry.last_used.load(Ordering::Relaxed);
                if oldest.as_ref().is_none_or(|(_, best)| used < *best) {
                    oldest = Some((entry.key().clone(), used));
                }
            }
            let Some((victim, _)) = oldest else { return };
            if let Some((_, entry)) = self.entries.remove(&victim) {
                self.used.fetch_sub(entry.weight, Ordering::Relaxed);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                return;
            }
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

/// Key for a cached byte range: file key, offset, length.
pub type RangeKey = (String, u64, u64);

/// The shared cache bundle carried by the query engine handle.
pub struct Caches {
    pub footers: ByteCache<String, ArrowReaderMetadata>,
    pub sidecars: ByteCache<String, EliasFano>,
    // Arc'd so chunk readers can hold it independently of the bundle
    ranges: Arc<ByteCache<RangeKey, Bytes>>,
}

impl Caches {
    pub fn new(settings: &Settings) -> Self {
        Self {
            footers: ByteCache::new(settings.footer_cache_bytes),
            sidecars: ByteCache::new(settings.ef_cache_bytes),
            ranges: Arc::new(ByteCache::new(settings.page_cache_bytes)),
        }
    }

    pub fn shared_ranges(&self) -> &Arc<ByteCache<RangeKey, Bytes>> {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_miss_accounting() {
        let cache: ByteCache<u32, u32> = ByteCache::new(1024);
        assert!(cache.get(&1).is_none());
        cache.insert(1, Arc::new(10), 8);
        assert_eq!(*cache.get(&1).unwrap(), 10);
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_budget_enforced() {
        let cache: ByteCache<u32, u32> = ByteCache::new(100);
        for i in 0..20 {
            cache.insert(i, Arc::new(i), 10);
        }
        assert!(cache.used_bytes() <= 100);
        assert!(cache.stats().evictions.load(Ordering::Relaxed) >= 10);
    }

    #[test]
    fn test_lru_order() {
        let cache: ByteCache<u32, u32> = ByteCache::new(30);
        cache.insert(1, Arc::new(1), 10);
        cache.insert(2, Arc::new(2), 10);
        cache.insert(3, Arc::new(3), 10);
        cache.get(&1); // keep 1 warm
        cache.insert(4, Arc::new(4), 10);
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&2).is_none(), "coldest entry should be evicted");
    }

    #[test]
    fn test_oversized_value_not_cached() {
        let cache: ByteCache<u32, u32> = ByteCache::new(10);
        cache.insert(1, Arc::new(1), 100);
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn test_get_or_try_insert() {
        let cache: ByteCache<u32, u32> = ByteCache::new(100);
        let value = cache.get_or_try_insert(&7, || Ok((Arc::new(49), 8))).unwrap();
        assert_eq!(*value, 49);
        // second call hits the cache, the closure must not run
        let value = cache
            .get_or_try_insert(&7, || panic!("should not recompute"))
            .unwrap();
        assert_eq!(*value, 49);
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<ByteCache<u64, u64>> = Arc::new(ByteCache::new(1 << 16));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..1000u64 {
                        cache.insert(i % 128, Arc::new(i + t), 64);
                        cache.get(&(i % 128));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.used_bytes() <= 1 << 16);
    }
}
