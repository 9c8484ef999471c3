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

//! `tracestore-storage` is the indexed span repository behind the tracestore
//! query API. It offers one write operation (`accept`) and six read
//! operations over two interchangeable backends:
//! - an in-memory store, used for tests and development;
//! - a PostgreSQL store (behind the `postgres` cargo feature) persisting
//!   spans across a `spans` and an `annotations` table.
//!
//! Both backends share the [`SpanStore`] contract and the same read-side
//! pipeline: partial span reports are merged by `(trace_id, id)`, then
//! shifted for clock skew between reporting hosts, before a trace is handed
//! to the caller.

pub mod config;
pub mod dependencies;
mod store;
pub mod trace;

#[cfg(test)]
pub(crate) mod tests;

pub use store::InMemorySpanStore;
#[cfg(feature = "postgres")]
pub use store::PostgresSpanStore;
#[cfg(any(test, feature = "testsuite"))]
pub use store::MockSpanStore;
pub use store::SpanStore;
