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

//! Error to status mapping for the wire API

use tonic::Status;

use provdb_core::error::ProvError;

/// Maps the engine taxonomy onto gRPC status codes. "Not found" never
/// reaches here for artifacts (those are empty results); a NotFound leaking
/// from storage means a file vanished under us.
pub fn status_from(err: ProvError) -> Status {
    match &err {
        ProvError::InvalidSwhid(_) | ProvError::InvalidArgument(_) => {
            Status::invalid_argument(err.to_string())
        }
        ProvError::Cancelled => Status::cancelled(err.to_string()),
        ProvError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        ProvError::Transient(_) | ProvError::Io(_) | ProvError::NotFound(_) => {
            Status::unavailable(err.to_string())
        }
        ProvError::IncompleteInput(_) => Status::failed_precondition(err.to_string()),
        ProvError::Corruption { .. } | ProvError::Internal(_) => Status::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_from(ProvError::InvalidSwhid("x".into())).code(), Code::InvalidArgument);
        assert_eq!(status_from(ProvError::DeadlineExceeded).code(), Code::DeadlineExceeded);
        assert_eq!(status_from(ProvError::Cancelled).code(), Code::Cancelled);
        assert_eq!(status_from(ProvError::Transient("reset".into())).code(), Code::Unavailable);
        assert_eq!(
            status_from(ProvError::corruption("part", "bad bytes")).code(),
            Code::Internal
        );
        assert_eq!(
            status_from(ProvError::IncompleteInput("no tables".into())).code(),
            Code::FailedPrecondition
        );
    }
}
