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

use tracestore_model::Span;

/// Fills in `timestamp` and `duration` from the span's annotations when they
/// were not reported explicitly.
///
/// The timestamp becomes the earliest annotation timestamp; the duration
/// becomes the distance to the latest one. A single annotation is not enough
/// to infer a duration, so it is left unset in that case.
pub fn apply_timestamp_and_duration(mut span: Span) -> Span {
    if (span.timestamp.is_some() && span.duration.is_some()) || span.annotations.is_empty() {
        return span;
    }
    let annotation_timestamps = || span.annotations.iter().map(|annotation| annotation.timestamp);
    let Some(first_timestamp) = annotation_timestamps().min() else {
        return span;
    };
    let Some(last_timestamp) = annotation_timestamps().max() else {
        return span;
    };
    if span.timestamp.is_none() {
        span.timestamp = Some(first_timestamp);
    }
    if span.duration.is_none() && last_timestamp > first_timestamp {
        span.duration = Some(last_timestamp - first_timestamp);
    }
    span
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tracestore_model::{Annotation, Span};

    use super::*;

    #[test]
    fn test_timestamp_and_duration_inferred_from_annotations() {
        let span = Span::builder(1, 1)
            .annotation(Annotation::new(1_000, "sr", None))
            .annotation(Annotation::new(1_500, "ss", None))
            .build();
        let span = apply_timestamp_and_duration(span);
        assert_eq!(span.timestamp, Some(1_000));
        assert_eq!(span.duration, Some(500));
    }

    #[test]
    fn test_explicit_fields_win() {
        let span = Span::builder(1, 1)
            .timestamp(900)
            .duration(50)
            .annotation(Annotation::new(1_000, "sr", None))
            .annotation(Annotation::new(1_500, "ss", None))
            .build();
        let span = apply_timestamp_and_duration(span);
        assert_eq!(span.timestamp, Some(900));
        assert_eq!(span.duration, Some(50));
    }

    #[test]
    fn test_duration_spans_the_annotations_even_with_explicit_timestamp() {
        let span = Span::builder(1, 1)
            .timestamp(900)
            .annotation(Annotation::new(1_000, "sr", None))
            .annotation(Annotation::new(1_500, "ss", None))
            .build();
        let span = apply_timestamp_and_duration(span);
        assert_eq!(span.timestamp, Some(900));
        assert_eq!(span.duration, Some(500));
    }

    #[test]
    fn test_single_annotation_yields_no_duration() {
        let span = Span::builder(1, 1)
            .annotation(Annotation::new(1_000, "sr", None))
            .build();
        let span = apply_timestamp_and_duration(span);
        assert_eq!(span.timestamp, Some(1_000));
        assert_eq!(span.duration, None);
    }

    #[test]
    fn test_no_annotations_is_a_no_op() {
        let span = Span::builder(1, 1).build();
        let span = apply_timestamp_and_duration(span);
        assert_eq!(span.timestamp, None);
        assert_eq!(span.duration, None);
    }

    proptest! {
        #[test]
        fn proptest_closed_form(annotation_timestamps in proptest::collection::vec(0i64..1_000_000, 1..8)) {
            let mut builder = Span::builder(1, 1);
            for &timestamp in &annotation_timestamps {
                builder = builder.annotation(Annotation::new(timestamp, "event", None));
            }
            let span = apply_timestamp_and_duration(builder.build());
            let first = *annotation_timestamps.iter().min().unwrap();
            let last = *annotation_timestamps.iter().max().unwrap();
            prop_assert_eq!(span.timestamp, Some(first));
            if last > first {
                prop_assert_eq!(span.duration, Some(last - first));
            } else {
                prop_assert_eq!(span.duration, None);
            }
        }
    }
}
