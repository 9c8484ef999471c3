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

//! `tracestore-model` defines the record types shared by every tracestore
//! backend: spans and their annotations, query requests, dependency links,
//! and the error type surfaced by store operations.
//!
//! All timestamps and durations are expressed in microseconds since the Unix
//! epoch, except where a type explicitly documents milliseconds.

pub mod constants;
mod dependencies;
mod error;
mod query;
mod span;

pub use dependencies::DependencyLink;
pub use error::{StoreError, StoreResult};
pub use query::QueryRequest;
pub use span::{Annotation, AnnotationType, BinaryAnnotation, Endpoint, Span, SpanBuilder};
