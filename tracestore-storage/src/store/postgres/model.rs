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

use tracestore_model::{
    Annotation, AnnotationType, BinaryAnnotation, Endpoint, Span, StoreError, StoreResult,
};

use super::PLAIN_ANNOTATION_TYPE;

/// A row of the `spans` table.
#[derive(sqlx::FromRow)]
pub(super) struct PgSpan {
    pub trace_id: i64,
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub start_ts: Option<i64>,
    pub duration: Option<i64>,
    pub debug: Option<bool>,
}

impl PgSpan {
    /// Converts the row into a span without annotations; they are attached
    /// afterwards from the `annotations` rows of the same `(trace_id, id)`.
    pub(super) fn into_span(self) -> Span {
        Span {
            trace_id: self.trace_id,
            id: self.id,
            parent_id: self.parent_id,
            name: self.name,
            timestamp: self.start_ts,
            duration: self.duration,
            debug: self.debug,
            annotations: Vec::new(),
            binary_annotations: Vec::new(),
        }
    }
}

/// A row of the `annotations` table, holding either a plain annotation
/// (`a_type = -1`) or a binary annotation (`a_type >= 0`).
#[derive(sqlx::FromRow)]
pub(super) struct PgAnnotation {
    pub trace_id: i64,
    pub span_id: i64,
    pub a_key: String,
    pub a_value: Option<Vec<u8>>,
    pub a_type: i32,
    pub a_timestamp: i64,
    pub endpoint_service_name: Option<String>,
    pub endpoint_ipv4: Option<i32>,
    pub endpoint_port: Option<i16>,
}

impl PgAnnotation {
    fn endpoint(&self) -> Option<Endpoint> {
        let service_name = self.endpoint_service_name.as_ref()?;
        let mut endpoint = Endpoint::new(service_name.clone(), self.endpoint_ipv4.unwrap_or(0));
        if let Some(port) = self.endpoint_port {
            endpoint = endpoint.with_port(port);
        }
        Some(endpoint)
    }

    /// Rebuilds the annotation this row encodes and appends it to `span`.
    pub(super) fn attach_to(self, span: &mut Span) -> StoreResult<()> {
        let endpoint = self.endpoint();
        if self.a_type == PLAIN_ANNOTATION_TYPE {
            span.annotations
                .push(Annotation::new(self.a_timestamp, self.a_key, endpoint));
            return Ok(());
        }
        let annotation_type =
            AnnotationType::from_value(self.a_type).ok_or_else(|| StoreError::Corrupt {
                message: format!(
                    "unknown annotation type code `{}` for key `{}`",
                    self.a_type, self.a_key
                ),
            })?;
        span.binary_annotations.push(BinaryAnnotation::new(
            self.a_key,
            self.a_value.unwrap_or_default(),
            annotation_type,
            endpoint,
        ));
        Ok(())
    }
}

/// Projection used to derive dependency links without materializing whole
/// traces.
#[derive(sqlx::FromRow)]
pub(super) struct PgDependencyLinkRow {
    pub trace_id: i64,
    pub parent_id: Option<i64>,
    pub id: i64,
    pub a_key: Option<String>,
    pub endpoint_service_name: Option<String>,
}
