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

//! Cooperative cancellation and deadlines
//!
//! Every query carries a [`Deadline`]; lookups check it before each storage
//! read and each row-group decode. Cancellation is cooperative: in-flight
//! reads complete and their results are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ProvError, Result};

#[derive(Debug, Clone)]
pub struct Deadline {
    cancelled: Arc<AtomicBool>,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires and cannot be cancelled externally.
    pub fn unbounded() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            expires_at: None,
        }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// A child deadline sharing this one's cancellation flag but expiring at
    /// the earlier of the parent's expiry and `now + timeout`.
    pub fn child(&self, timeout: Duration) -> Self {
        let child_expiry = Instant::now() + timeout;
        Self {
            cancelled: Arc::clone(&self.cancelled),
            expires_at: Some(match self.expires_at {
                Some(parent) => parent.min(child_expiry),
                None => child_expiry,
            }),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns the typed failure if the work should stop.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ProvError::Cancelled);
        }
        if self.is_expired() {
            return Err(ProvError::DeadlineExceeded);
        }
        Ok(())
    }
}
