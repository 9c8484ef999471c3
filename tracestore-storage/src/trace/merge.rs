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

use std::collections::HashMap;

use tracestore_model::{Annotation, BinaryAnnotation, Span};

use super::span_order_key;

/// Combines partial reports of the same `(trace_id, id)` into one span per
/// identity.
///
/// Field precedence across copies:
/// - `name`: the earliest named copy wins (`""`/`"unknown"` never win);
/// - `timestamp`: minimum of the reported values;
/// - `duration`: maximum of the reported values;
/// - `debug`: logical OR of the reported values;
/// - `parent_id`: first non-null;
/// - annotations and binary annotations: deduplicated unions.
///
/// The output is sorted by `(timestamp, id)`, spans without a timestamp
/// first.
pub fn merge_by_id(spans: Vec<Span>) -> Vec<Span> {
    let mut identities: Vec<(i64, i64)> = Vec::new();
    let mut copies_by_identity: HashMap<(i64, i64), Vec<Span>> = HashMap::new();
    for span in spans {
        let identity = (span.trace_id, span.id);
        copies_by_identity
            .entry(identity)
            .or_insert_with(|| {
                identities.push(identity);
                Vec::new()
            })
            .push(span);
    }
    let mut merged_spans: Vec<Span> = identities
        .into_iter()
        .filter_map(|identity| copies_by_identity.remove(&identity))
        .map(merge_copies)
        .collect();
    merged_spans.sort_by_key(span_order_key);
    merged_spans
}

fn merge_copies(copies: Vec<Span>) -> Span {
    let trace_id = copies[0].trace_id;
    let id = copies[0].id;
    let name = copies
        .iter()
        .find(|copy| !copy.is_unnamed())
        .unwrap_or(&copies[0])
        .name
        .clone();
    let parent_id = copies.iter().find_map(|copy| copy.parent_id);
    let timestamp = copies.iter().filter_map(|copy| copy.timestamp).min();
    let duration = copies.iter().filter_map(|copy| copy.duration).max();
    let debug = copies
        .iter()
        .filter_map(|copy| copy.debug)
        .reduce(|left, right| left || right);

    let mut annotations: Vec<Annotation> = copies
        .iter()
        .flat_map(|copy| copy.annotations.iter().cloned())
        .collect();
    annotations.sort();
    annotations.dedup();

    let mut binary_annotations: Vec<BinaryAnnotation> = copies
        .iter()
        .flat_map(|copy| copy.binary_annotations.iter().cloned())
        .collect();
    // The full tuple participates in the sort so that identical reports end
    // up adjacent for `dedup`; the observable order is still by key.
    binary_annotations.sort_by(|left, right| {
        (&left.key, &left.value, left.annotation_type.value(), &left.endpoint).cmp(&(
            &right.key,
            &right.value,
            right.annotation_type.value(),
            &right.endpoint,
        ))
    });
    binary_annotations.dedup();

    Span {
        trace_id,
        id,
        parent_id,
        name,
        timestamp,
        duration,
        debug,
        annotations,
        binary_annotations,
    }
}
