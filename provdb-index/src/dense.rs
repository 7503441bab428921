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

//! Dense per-node timestamp arrays
//!
//! Stages A and B hand their results to later stages as arrays indexed by
//! node id. `i64::MIN` is the "no value" sentinel: a content no dated
//! revision reaches, or a directory whose subtree holds no dated content.
//!
//! Serialized format: magic "PTA\x01", u64 length, little-endian i64 values,
//! 32-byte BLAKE3 checksum.

use std::sync::atomic::AtomicI64;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use provdb_core::error::{ProvError, Result};
use provdb_core::graph::NodeId;

const MAGIC: [u8; 4] = [0x50, 0x54, 0x41, 0x01];
const CHECKSUM_LEN: usize = 32;

/// Sentinel for "no timestamp known".
pub const UNSET: i64 = i64::MIN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseTimestamps {
    values: Vec<i64>,
}

impl DenseTimestamps {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            values: vec![UNSET; num_nodes],
        }
    }

    pub fn from_values(values: Vec<i64>) -> Self {
        Self { values }
    }

    /// Collapses a shared atomic array, mapping any remaining `placeholder`
    /// slots to the sentinel.
    pub fn from_atomic(slots: Vec<AtomicI64>, placeholder: i64) -> Self {
        let values = slots
            .into_iter()
            .map(|slot| {
                let value = slot.into_inner();
                if value == placeholder {
                    UNSET
                } else {
                    value
                }
            })
            .collect();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<i64> {
        match self.values.get(node as usize) {
            Some(&UNSET) | None => None,
            Some(&value) => Some(value),
        }
    }

    pub fn set(&mut self, node: NodeId, value: i64) {
        self.values[node as usize] = value;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 8 + self.values.len() * 8 + CHECKSUM_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.write_u64::<LittleEndian>(self.values.len() as u64).unwrap();
        for &value in &self.values {
            buf.write_i64::<LittleEndian>(value).unwrap();
        }
        let checksum = blake3::hash(&buf);
        buf.extend_from_slice(checksum.as_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8], location: &str) -> Result<Self> {
        let corrupt = |details: &str| ProvError::corruption(location, details);
        if bytes.len() < 4 + 8 + CHECKSUM_LEN {
            return Err(corrupt("timestamp array truncated"));
        }
        if bytes[..4] != MAGIC {
            return Err(corrupt("bad timestamp array magic"));
        }
        let (data, stored_checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(data).as_bytes() != stored_checksum {
            return Err(corrupt("timestamp array checksum mismatch"));
        }
        let len = LittleEndian::read_u64(&data[4..12]) as usize;
        if data.len() != 4 + 8 + len * 8 {
            return Err(corrupt("timestamp array length inconsistent with header"));
        }
        let mut values = Vec::with_capacity(len);
        for chunk in data[12..].chunks_exact(8) {
            values.push(LittleEndian::read_i64(chunk));
        }
        Ok(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut array = DenseTimestamps::new(5);
        array.set(1, 42);
        array.set(3, -7);
        let restored = DenseTimestamps::from_bytes(&array.to_bytes(), "t.bin").unwrap();
        assert_eq!(restored, array);
        assert_eq!(restored.get(0), None);
        assert_eq!(restored.get(1), Some(42));
        assert_eq!(restored.get(3), Some(-7));
        assert_eq!(restored.get(99), None);
    }

    #[test]
    fn test_from_atomic_maps_placeholder() {
        let slots = vec![AtomicI64::new(i64::MAX), AtomicI64::new(12)];
        let array = DenseTimestamps::from_atomic(slots, i64::MAX);
        assert_eq!(array.get(0), None);
        assert_eq!(array.get(1), Some(12));
    }

    #[test]
    fn test_corruption_detected() {
        let array = DenseTimestamps::new(3);
        let mut bytes = array.to_bytes();
        bytes[8] ^= 0x01;
        assert!(DenseTimestamps::from_bytes(&bytes, "t.bin").is_err());
    }
}
