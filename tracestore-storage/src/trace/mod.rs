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

//! The read-side trace pipeline and write-side normalization.
//!
//! None of these functions can fail: malformed inputs are passed through
//! best-effort.

mod matcher;
mod merge;
mod normalize;
mod skew;

pub use matcher::matches_query;
pub use merge::merge_by_id;
pub use normalize::apply_timestamp_and_duration;
pub use skew::correct_for_clock_skew;

use tracestore_model::Span;

/// The read-side pipeline shared by the backends: merge duplicate reports of
/// each span, fill in timestamps and durations derivable from the merged
/// annotations, and correct clock skew between reporting hosts.
///
/// Normalization runs after the merge so that a duration spanning several
/// partial reports is derived from the union of their annotations.
pub fn reconstruct_trace(spans: Vec<Span>) -> Vec<Span> {
    let mut spans: Vec<Span> = merge_by_id(spans)
        .into_iter()
        .map(apply_timestamp_and_duration)
        .collect();
    spans.sort_by_key(span_order_key);
    correct_for_clock_skew(spans)
}

/// Ordering key for spans within a trace: `(timestamp, id)` ascending, spans
/// without a timestamp first.
pub(crate) fn span_order_key(span: &Span) -> (i64, i64) {
    (span.timestamp.unwrap_or(i64::MIN), span.id)
}

/// Sorts traces between each other by their root span, most recent first.
pub(crate) fn sort_traces_descending(traces: &mut [Vec<Span>]) {
    traces.sort_by(|left, right| {
        let left_key = left.first().map(span_order_key);
        let right_key = right.first().map(span_order_key);
        right_key.cmp(&left_key)
    });
}
