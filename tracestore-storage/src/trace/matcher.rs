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

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracestore_model::{AnnotationType, QueryRequest, Span};

/// Evaluates a [`QueryRequest`] against a merged trace.
///
/// Each remaining criterion is consumed as soon as any span satisfies it, so
/// a trace may satisfy different criteria through different spans. The
/// evaluation is total: a predicate over absent data is simply false.
pub fn matches_query(request: &QueryRequest, trace: &[Span]) -> bool {
    let Some(root_timestamp) = trace.first().and_then(|root| root.timestamp) else {
        return false;
    };
    let end_ts_micros = request.end_ts * 1_000;
    let lookback_micros = request.lookback * 1_000;
    if root_timestamp < end_ts_micros - lookback_micros || root_timestamp > end_ts_micros {
        return false;
    }

    let service_name = request.service_name.to_ascii_lowercase();
    let mut span_name: Option<String> = request
        .span_name
        .as_ref()
        .map(|span_name| span_name.to_ascii_lowercase());
    let mut annotations: BTreeSet<String> = request.annotations.clone();
    let mut binary_annotations: BTreeMap<String, String> = request.binary_annotations.clone();
    let mut tested_duration = request.min_duration.is_none() && request.max_duration.is_none();
    let mut trace_service_names: HashSet<&str> = HashSet::new();

    for span in trace {
        let mut span_service_names: HashSet<&str> = HashSet::new();

        for annotation in &span.annotations {
            annotations.remove(&annotation.value);
            if let Some(endpoint) = &annotation.endpoint {
                trace_service_names.insert(endpoint.service_name.as_str());
                span_service_names.insert(endpoint.service_name.as_str());
            }
        }

        for binary_annotation in &span.binary_annotations {
            let requested_value = binary_annotations
                .get(&binary_annotation.key)
                .map(|value| value.as_bytes());
            if binary_annotation.annotation_type == AnnotationType::String
                && requested_value == Some(binary_annotation.value.as_slice())
            {
                binary_annotations.remove(&binary_annotation.key);
            }
            if let Some(endpoint) = &binary_annotation.endpoint {
                trace_service_names.insert(endpoint.service_name.as_str());
                span_service_names.insert(endpoint.service_name.as_str());
            }
        }

        if span_service_names.contains(service_name.as_str()) && !tested_duration {
            if let (Some(min_duration), Some(duration)) = (request.min_duration, span.duration) {
                tested_duration = match request.max_duration {
                    Some(max_duration) => duration >= min_duration && duration <= max_duration,
                    None => duration >= min_duration,
                };
            }
        }

        if span_name.as_deref() == Some(span.name.as_str()) {
            span_name = None;
        }
    }

    trace_service_names.contains(service_name.as_str())
        && span_name.is_none()
        && annotations.is_empty()
        && binary_annotations.is_empty()
        && tested_duration
}
