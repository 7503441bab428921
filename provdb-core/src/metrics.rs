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

//! StatsD metrics emission
//!
//! Counters and timers are fire-and-forget UDP; a send failure must never
//! affect a request, so every emission swallows its result. With no address
//! configured all metrics go to a no-op sink.

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use cadence::{Counted, CountedExt, NopMetricSink, StatsdClient, Timed, UdpMetricSink};

use crate::error::{ProvError, Result};

/// Counter names used by the query path.
pub mod keys {
    pub const POINTS_LOOKED_UP: &str = "points_looked_up";
    pub const FILES_PRUNED_BY_EF: &str = "files_pruned_by_ef";
    pub const ROW_GROUPS_SKIPPED: &str = "row_groups_skipped";
    pub const CACHE_HITS: &str = "cache_hits";
    pub const CACHE_MISSES: &str = "cache_misses";
}

#[derive(Clone)]
pub struct Metrics {
    client: Arc<StatsdClient>,
}

impl Metrics {
    /// Connects a UDP sink, or a no-op sink when `addr` is `None`.
    pub fn new(prefix: &str, addr: Option<&str>) -> Result<Self> {
        let client = match addr {
            Some(addr) => {
                let socket = UdpSocket::bind("0.0.0.0:0")?;
                let sink = UdpMetricSink::from(addr, socket).map_err(|e| {
                    ProvError::InvalidArgument(format!("bad StatsD address {addr}: {e}"))
                })?;
                StatsdClient::from_sink(prefix, sink)
            }
            None => StatsdClient::from_sink(prefix, NopMetricSink),
        };
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: Arc::new(StatsdClient::from_sink("provdb", NopMetricSink)),
        }
    }

    pub fn incr(&self, key: &str) {
        let _ = self.client.incr(key);
    }

    pub fn count(&self, key: &str, value: u64) {
        if value > 0 {
            let _ = self.client.count(key, value as i64);
        }
    }

    pub fn time(&self, key: &str, elapsed: Duration) {
        let _ = self.client.time(key, elapsed.as_millis() as u64);
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
