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

mod in_memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
pub use in_memory::InMemorySpanStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSpanStore;
use tracestore_model::{DependencyLink, QueryRequest, Span, StoreResult};

/// The span store contract shared by every backend. Which backend serves a
/// deployment is a runtime configuration choice; see [`crate::config`].
///
/// Spans handed out by the read operations are snapshots: mutating them has
/// no effect on the store. Cancellation is cooperative; dropping the future
/// of an operation abandons it at its next suspension point, which for the
/// relational backend is the next driver call.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait SpanStore: Send + Sync + 'static {
    /// Stores a batch of spans, deriving timestamps and durations from
    /// annotations where they were not reported.
    ///
    /// Accepts any batch size, including zero. The call returns once every
    /// span is durably placed, or reports the first failure; partial success
    /// within a batch is not exposed.
    async fn accept(&self, spans: Vec<Span>) -> StoreResult<()>;

    /// Returns the traces matching every criterion of the request, most
    /// recent first, capped at `request.limit`.
    async fn get_traces(&self, request: QueryRequest) -> StoreResult<Vec<Vec<Span>>>;

    /// Returns the merged, clock-skew-corrected trace, or `None` when the
    /// trace id is unknown.
    async fn get_trace(&self, trace_id: i64) -> StoreResult<Option<Vec<Span>>>;

    /// Returns the trace exactly as reported, without merging duplicate
    /// span reports or correcting clock skew.
    async fn get_raw_trace(&self, trace_id: i64) -> StoreResult<Option<Vec<Span>>>;

    /// Returns all known service names, ascending.
    async fn get_service_names(&self) -> StoreResult<Vec<String>>;

    /// Returns the span names recorded for a service, ascending. The service
    /// name is matched case-insensitively.
    async fn get_span_names(&self, service_name: &str) -> StoreResult<Vec<String>>;

    /// Derives the service dependency graph over the window ending at
    /// `end_ts` (milliseconds). `lookback` (milliseconds) defaults to
    /// `end_ts`, i.e. looking back to the epoch.
    async fn get_dependencies(
        &self,
        end_ts: i64,
        lookback: Option<i64>,
    ) -> StoreResult<Vec<DependencyLink>>;
}
