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

//! Runtime settings
//!
//! Flags win over environment variables; environment variables win over
//! defaults. Recognized variables: `SWH_PROVENANCE_GRAPH_PATH`,
//! `SWH_PROVENANCE_DB_URL`, `SWH_PROVENANCE_STATSD_ADDR`. Log filtering goes
//! through `RUST_LOG` and is handled by the binary's subscriber setup.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_GRAPH_PATH: &str = "SWH_PROVENANCE_GRAPH_PATH";
pub const ENV_DB_URL: &str = "SWH_PROVENANCE_DB_URL";
pub const ENV_STATSD_ADDR: &str = "SWH_PROVENANCE_STATSD_ADDR";

#[derive(Debug, Clone)]
pub struct Settings {
    pub graph_path: Option<PathBuf>,
    pub db_url: Option<String>,
    pub statsd_addr: Option<String>,
    pub workers: usize,
    /// Hash buckets per table; one primary key lives in exactly one bucket.
    pub buckets: usize,
    pub footer_cache_bytes: u64,
    pub ef_cache_bytes: u64,
    pub page_cache_bytes: u64,
    pub request_timeout: Duration,
    pub lookup_timeout: Duration,
    pub retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graph_path: None,
            db_url: None,
            statsd_addr: None,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            buckets: 8,
            footer_cache_bytes: 64 << 20,
            ef_cache_bytes: 64 << 20,
            page_cache_bytes: 256 << 20,
            request_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(5),
            retries: 3,
        }
    }
}

impl Settings {
    /// Defaults overlaid with the recognized environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(path) = std::env::var(ENV_GRAPH_PATH) {
            settings.graph_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var(ENV_DB_URL) {
            settings.db_url = Some(url);
        }
        if let Ok(addr) = std::env::var(ENV_STATSD_ADDR) {
            settings.statsd_addr = Some(addr);
        }
        settings
    }
}
