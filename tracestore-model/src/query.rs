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

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

/// Default number of traces returned by a search.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Criteria for a trace search. A trace matches when it satisfies every
/// criterion; see the query matcher for the exact evaluation rules.
///
/// `end_ts` and `lookback` are expressed in milliseconds; they are converted
/// to microseconds exactly once, at the store boundary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Required. Matched case-insensitively against endpoint service names.
    pub service_name: String,
    /// When set, some span of the trace must carry this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_name: Option<String>,
    /// Annotation values that must all appear somewhere in the trace.
    #[serde(default)]
    pub annotations: BTreeSet<String>,
    /// `STRING`-typed binary annotations that must all appear, compared by
    /// key and UTF-8 value.
    #[serde(default)]
    pub binary_annotations: BTreeMap<String, String>,
    /// Minimum duration in microseconds of some span involving the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<i64>,
    /// Maximum duration in microseconds. Only considered when `min_duration`
    /// is also set; defaults to no upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<i64>,
    /// End of the search window, in milliseconds since epoch.
    pub end_ts: i64,
    /// Length of the search window, in milliseconds.
    pub lookback: i64,
    /// Maximum number of traces to return.
    pub limit: usize,
}

impl Default for QueryRequest {
    fn default() -> Self {
        QueryRequest {
            service_name: String::new(),
            span_name: None,
            annotations: BTreeSet::new(),
            binary_annotations: BTreeMap::new(),
            min_duration: None,
            max_duration: None,
            end_ts: 0,
            lookback: 0,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl QueryRequest {
    /// Rejects requests no store can answer.
    pub fn validate(&self) -> StoreResult<()> {
        if self.service_name.is_empty() {
            return Err(StoreError::InvalidArgument {
                message: "`service_name` is required".to_string(),
            });
        }
        if self.limit == 0 {
            return Err(StoreError::InvalidArgument {
                message: "`limit` must be at least 1".to_string(),
            });
        }
        if let Some(min_duration) = self.min_duration {
            if min_duration < 0 {
                return Err(StoreError::InvalidArgument {
                    message: "`min_duration` must not be negative".to_string(),
                });
            }
        }
        Ok(())
    }
}
