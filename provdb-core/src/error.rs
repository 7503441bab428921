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

//! Error types for ProvDB
//!
//! One taxonomy for the whole workspace. Input errors are user-visible and
//! never retried; transient storage errors are retried with backoff before
//! surfacing; corruption marks the offending file bad for the rest of the
//! process lifetime.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid SWHID: {0}")]
    InvalidSwhid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("Corruption detected in {location}: {details}")]
    Corruption { location: String, details: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Incomplete input: {0}")]
    IncompleteInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvError {
    /// Shorthand for a corruption error bound to a file or table location.
    pub fn corruption(location: impl Into<String>, details: impl Into<String>) -> Self {
        ProvError::Corruption {
            location: location.into(),
            details: details.into(),
        }
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProvError::Transient(_) => true,
            ProvError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvError>;
