// Copyright (C) 2023 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};

/// Error kinds surfaced by span store operations.
///
/// The in-memory backend can only ever produce `InvalidArgument`.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq, Serialize, Deserialize)]
pub enum StoreError {
    /// The request itself is malformed: missing service name, zero limit, ...
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Transient backend failure (connection refused, pool timeout). Callers
    /// may retry.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    /// Unexpected schema or state mismatch. Not retryable.
    #[error("storage corrupted: {message}")]
    Corrupt { message: String },

    /// The caller's context was cancelled mid-operation.
    #[error("operation cancelled: {message}")]
    Cancelled { message: String },

    /// Any other backend error.
    #[error("internal error: {message}; cause: `{cause}`")]
    Internal { message: String, cause: String },
}

impl StoreError {
    /// Whether retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Generic result type for span store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable {
            message: "connection refused".to_string()
        }
        .is_retryable());
        assert!(!StoreError::Corrupt {
            message: "unknown annotation type code `42`".to_string()
        }
        .is_retryable());
        assert!(!StoreError::InvalidArgument {
            message: "service name is required".to_string()
        }
        .is_retryable());
    }
}
