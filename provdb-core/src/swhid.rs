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

//! Persistent identifiers for archived software artifacts
//!
//! A SWHID is a 20-byte salted SHA-1 plus a node type tag, rendered as
//! `swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2`. On disk the `nodes`
//! table stores the 22-byte form: one type byte, one version byte, then the
//! raw hash.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProvError, Result};

/// Length of the raw hash.
pub const HASH_LEN: usize = 20;

/// Length of the on-disk encoding: type byte + version byte + hash.
pub const ENCODED_LEN: usize = 22;

/// Identifier format version.
pub const SWHID_VERSION: u8 = 1;

/// Node types in the archive graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Content,
    Directory,
    Revision,
    Release,
    Snapshot,
    Origin,
}

impl NodeType {
    /// Stable one-byte code used in the 22-byte encoding.
    pub fn code(self) -> u8 {
        match self {
            NodeType::Content => 1,
            NodeType::Directory => 2,
            NodeType::Revision => 3,
            NodeType::Release => 4,
            NodeType::Snapshot => 5,
            NodeType::Origin => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => NodeType::Content,
            2 => NodeType::Directory,
            3 => NodeType::Revision,
            4 => NodeType::Release,
            5 => NodeType::Snapshot,
            6 => NodeType::Origin,
            _ => return None,
        })
    }

    /// Three-letter tag used in the text form.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Content => "cnt",
            NodeType::Directory => "dir",
            NodeType::Revision => "rev",
            NodeType::Release => "rel",
            NodeType::Snapshot => "snp",
            NodeType::Origin => "ori",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "cnt" => NodeType::Content,
            "dir" => NodeType::Directory,
            "rev" => NodeType::Revision,
            "rel" => NodeType::Release,
            "snp" => NodeType::Snapshot,
            "ori" => NodeType::Origin,
            _ => return None,
        })
    }

    /// Whether this node kind can serve as a provenance anchor.
    pub fn is_anchor(self) -> bool {
        matches!(self, NodeType::Revision | NodeType::Release)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, versioned artifact identifier.
///
/// Ordering is (type, hash), which matches the lexicographic order of the
/// text form within a single type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Swhid {
    pub node_type: NodeType,
    pub hash: [u8; HASH_LEN],
}

impl Swhid {
    pub fn new(node_type: NodeType, hash: [u8; HASH_LEN]) -> Self {
        Self { node_type, hash }
    }

    /// The 22-byte on-disk encoding.
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        out[0] = self.node_type.code();
        out[1] = SWHID_VERSION;
        out[2..].copy_from_slice(&self.hash);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENCODED_LEN {
            return Err(ProvError::InvalidSwhid(format!(
                "expected {} bytes, got {}",
                ENCODED_LEN,
                bytes.len()
            )));
        }
        let node_type = NodeType::from_code(bytes[0])
            .ok_or_else(|| ProvError::InvalidSwhid(format!("unknown type code {}", bytes[0])))?;
        if bytes[1] != SWHID_VERSION {
            return Err(ProvError::InvalidSwhid(format!(
                "unsupported version {}",
                bytes[1]
            )));
        }
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&bytes[2..]);
        Ok(Self { node_type, hash })
    }
}

impl fmt::Display for Swhid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "swh:{}:{}:{}",
            SWHID_VERSION,
            self.node_type,
            hex::encode(self.hash)
        )
    }
}

impl FromStr for Swhid {
    type Err = ProvError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProvError::InvalidSwhid(s.to_string());
        let mut parts = s.splitn(4, ':');
        let ns = parts.next().ok_or_else(invalid)?;
        let version = parts.next().ok_or_else(invalid)?;
        let node_type = parts.next().ok_or_else(invalid)?;
        let hash_hex = parts.next().ok_or_else(invalid)?;
        if ns != "swh" || version != "1" {
            return Err(invalid());
        }
        let node_type = NodeType::parse(node_type).ok_or_else(invalid)?;
        if hash_hex.len() != HASH_LEN * 2 {
            return Err(invalid());
        }
        let raw = hex::decode(hash_hex).map_err(|_| invalid())?;
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&raw);
        Ok(Self { node_type, hash })
    }
}

impl Serialize for Swhid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Swhid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(seed: u8) -> [u8; HASH_LEN] {
        let mut hash = [0u8; HASH_LEN];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        hash
    }

    #[test]
    fn test_text_round_trip() {
        let swhid = Swhid::new(NodeType::Content, sample_hash(7));
        let text = swhid.to_string();
        assert!(text.starts_with("swh:1:cnt:"));
        assert_eq!(text.parse::<Swhid>().unwrap(), swhid);
    }

    #[test]
    fn test_bytes_round_trip() {
        for node_type in [
            NodeType::Content,
            NodeType::Directory,
            NodeType::Revision,
            NodeType::Release,
            NodeType::Snapshot,
            NodeType::Origin,
        ] {
            let swhid = Swhid::new(node_type, sample_hash(node_type.code()));
            assert_eq!(Swhid::from_bytes(&swhid.to_bytes()).unwrap(), swhid);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "swh:1:cnt",
            "swh:2:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2",
            "swh:1:xyz:94a9ed024d3859793618152ea559a168bbcbb5e2",
            "swh:1:cnt:94a9",
            "git:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2",
            "swh:1:cnt:zza9ed024d3859793618152ea559a168bbcbb5e2",
        ] {
            assert!(bad.parse::<Swhid>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_ordering_matches_text_within_type() {
        let a = Swhid::new(NodeType::Revision, sample_hash(1));
        let b = Swhid::new(NodeType::Revision, sample_hash(2));
        assert_eq!(a < b, a.to_string() < b.to_string());
    }
}
