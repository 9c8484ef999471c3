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

use tracestore_model::constants::{CLIENT_SEND, SERVER_RECV};
use tracestore_model::{Endpoint, Span};

/// Shifts spans whose host clock disagrees with their parent's so that
/// children fall within their parent's time window.
///
/// The skew between a client and a server host is estimated at every
/// parent/child boundary where the parent recorded `cs` and the child
/// recorded `sr`: the server receive should land halfway through the part of
/// the client span not spent in the server. The resulting shift propagates
/// to descendants reported by the same host; sibling subtrees on other hosts
/// are left alone, as are children that already fit inside their parent.
///
/// This is a heuristic correction. It removes visible inversions but does
/// not claim exact physical-clock alignment.
pub fn correct_for_clock_skew(spans: Vec<Span>) -> Vec<Span> {
    if spans.is_empty() {
        return spans;
    }
    let mut spans = spans;
    let index_by_id: HashMap<i64, usize> = spans
        .iter()
        .enumerate()
        .map(|(span_index, span)| (span.id, span_index))
        .collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); spans.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (span_index, span) in spans.iter().enumerate() {
        match span.parent_id {
            // A self-referencing or unresolvable parent makes the span a root.
            Some(parent_id) if parent_id != span.id => match index_by_id.get(&parent_id) {
                Some(&parent_index) if parent_index != span_index => {
                    children[parent_index].push(span_index)
                }
                _ => roots.push(span_index),
            },
            _ => roots.push(span_index),
        }
    }
    let mut visited = vec![false; spans.len()];
    for root_index in roots {
        adjust(&mut spans, &children, root_index, None, &mut visited);
    }
    spans
}

/// A clock offset attributed to one host: adding `amount` to the host's
/// timestamps aligns them with the rest of the trace.
struct ClockSkew {
    endpoint: Endpoint,
    amount: i64,
}

fn adjust(
    spans: &mut [Span],
    children: &[Vec<usize>],
    span_index: usize,
    skew: Option<&ClockSkew>,
    visited: &mut [bool],
) {
    if visited[span_index] {
        return;
    }
    visited[span_index] = true;
    if let Some(skew) = skew {
        let same_host = span_host(&spans[span_index]) == Some(&skew.endpoint);
        if same_host {
            apply_skew(&mut spans[span_index], skew.amount);
        }
    }
    for &child_index in &children[span_index] {
        match skew_at_boundary(&spans[span_index], &spans[child_index]) {
            Some(child_skew) => {
                adjust(spans, children, child_index, Some(&child_skew), visited);
            }
            None => adjust(spans, children, child_index, skew, visited),
        }
    }
}

/// Estimates the skew of the child's host against the parent's, or `None`
/// when nothing should be shifted.
fn skew_at_boundary(parent: &Span, child: &Span) -> Option<ClockSkew> {
    let parent_client_send = annotation_timestamp(parent, CLIENT_SEND)?;
    let child_server_recv = annotation_timestamp(child, SERVER_RECV)?;
    let child_host = span_host(child)?.clone();

    // A child that already fits inside the parent window is left untouched.
    if let (Some(parent_timestamp), Some(child_timestamp)) = (parent.timestamp, child.timestamp) {
        let child_end = child_timestamp + child.duration.unwrap_or(0);
        let fits_start = child_timestamp >= parent_timestamp;
        let fits_end = match parent.duration {
            Some(parent_duration) => child_end <= parent_timestamp + parent_duration,
            None => true,
        };
        if fits_start && fits_end {
            return None;
        }
    }

    let amount = match (parent.duration, child.duration) {
        (Some(parent_duration), Some(child_duration)) => {
            // A server span longer than its client span leaves no room to
            // place it; the skew is not inferable.
            if child_duration > parent_duration {
                return None;
            }
            parent_client_send + (parent_duration - child_duration) / 2 - child_server_recv
        }
        _ => parent_client_send - child_server_recv,
    };
    if amount == 0 {
        return None;
    }
    Some(ClockSkew {
        endpoint: child_host,
        amount,
    })
}

/// The host that reported a span: the endpoint of its first `sr` annotation,
/// else of its first `cs` annotation.
fn span_host(span: &Span) -> Option<&Endpoint> {
    annotation_endpoint(span, SERVER_RECV).or_else(|| annotation_endpoint(span, CLIENT_SEND))
}

fn annotation_endpoint<'a>(span: &'a Span, value: &str) -> Option<&'a Endpoint> {
    span.annotations
        .iter()
        .find(|annotation| annotation.value == value)
        .and_then(|annotation| annotation.endpoint.as_ref())
}

fn annotation_timestamp(span: &Span, value: &str) -> Option<i64> {
    span.annotations
        .iter()
        .find(|annotation| annotation.value == value)
        .map(|annotation| annotation.timestamp)
}

fn apply_skew(span: &mut Span, amount: i64) {
    if let Some(timestamp) = span.timestamp {
        span.timestamp = Some(timestamp + amount);
    }
    for annotation in &mut span.annotations {
        annotation.timestamp += amount;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tracestore_model::Annotation;

    use crate::trace::{apply_timestamp_and_duration, merge_by_id};

    use super::*;

    fn host_a() -> Option<Endpoint> {
        Some(Endpoint::new("app", 10))
    }

    fn host_b() -> Option<Endpoint> {
        Some(Endpoint::new("backend", 20))
    }

    fn client_server_trace(client_send: i64, client_recv: i64, server_recv: i64, server_send: i64) -> Vec<Span> {
        let parent = Span::builder(1, 1)
            .annotation(Annotation::new(client_send, "cs", host_a()))
            .annotation(Annotation::new(client_recv, "cr", host_a()))
            .build();
        let child = Span::builder(1, 2)
            .parent_id(1)
            .annotation(Annotation::new(server_recv, "sr", host_b()))
            .annotation(Annotation::new(server_send, "ss", host_b()))
            .build();
        merge_by_id(vec![
            apply_timestamp_and_duration(parent),
            apply_timestamp_and_duration(child),
        ])
    }

    #[test]
    fn test_child_shifted_into_parent_window() {
        // Host B runs 500µs behind host A.
        let corrected = correct_for_clock_skew(client_server_trace(1_000, 2_000, 500, 1_500));
        let parent = corrected.iter().find(|span| span.id == 1).unwrap();
        let child = corrected.iter().find(|span| span.id == 2).unwrap();
        assert_eq!(parent.timestamp, Some(1_000));
        assert_eq!(child.timestamp, Some(1_000));
        let server_recv = child
            .annotations
            .iter()
            .find(|annotation| annotation.value == "sr")
            .unwrap();
        assert!(server_recv.timestamp >= 1_000 && server_recv.timestamp <= 2_000);
    }

    #[test]
    fn test_child_within_parent_window_untouched() {
        let corrected = correct_for_clock_skew(client_server_trace(1_000, 2_000, 1_200, 1_700));
        let child = corrected.iter().find(|span| span.id == 2).unwrap();
        assert_eq!(child.timestamp, Some(1_200));
    }

    #[test]
    fn test_child_longer_than_parent_untouched() {
        let corrected = correct_for_clock_skew(client_server_trace(1_000, 1_200, 100, 2_000));
        let child = corrected.iter().find(|span| span.id == 2).unwrap();
        assert_eq!(child.timestamp, Some(100));
    }

    #[test]
    fn test_shift_propagates_to_same_host_descendants() {
        let parent = Span::builder(1, 1)
            .annotation(Annotation::new(1_000, "cs", host_a()))
            .annotation(Annotation::new(2_000, "cr", host_a()))
            .build();
        let child = Span::builder(1, 2)
            .parent_id(1)
            .annotation(Annotation::new(500, "sr", host_b()))
            .annotation(Annotation::new(1_500, "ss", host_b()))
            .build();
        // A local child of the server span, reported by the same host.
        let grandchild = Span::builder(1, 3)
            .parent_id(2)
            .timestamp(600)
            .duration(100)
            .annotation(Annotation::new(600, "sr", host_b()))
            .build();
        let corrected = correct_for_clock_skew(merge_by_id(vec![
            apply_timestamp_and_duration(parent),
            apply_timestamp_and_duration(child),
            apply_timestamp_and_duration(grandchild),
        ]));
        let grandchild = corrected
            .iter()
            .find(|span| span.id == 3)
            .unwrap();
        assert_eq!(grandchild.timestamp, Some(1_100));
    }

    #[test]
    fn test_cycles_do_not_hang() {
        let first = Span::builder(1, 1).parent_id(2).timestamp(100).build();
        let second = Span::builder(1, 2).parent_id(1).timestamp(200).build();
        let self_loop = Span::builder(1, 3).parent_id(3).timestamp(300).build();
        let corrected = correct_for_clock_skew(vec![first, second, self_loop]);
        assert_eq!(corrected.len(), 3);
    }

    proptest! {
        #[test]
        fn proptest_child_starts_at_or_after_parent(
            client_send in 10_000i64..20_000,
            client_duration in 1_000i64..10_000,
            server_offset in -20_000i64..20_000,
            server_duration_fraction in 0i64..100,
        ) {
            let client_recv = client_send + client_duration;
            let server_duration = client_duration * server_duration_fraction / 100;
            let server_recv = client_send + server_offset;
            let server_send = server_recv + server_duration;
            let corrected =
                correct_for_clock_skew(client_server_trace(client_send, client_recv, server_recv, server_send));
            let parent_timestamp = corrected
                .iter()
                .find(|span| span.id == 1)
                .unwrap()
                .timestamp
                .unwrap();
            let child = corrected.iter().find(|span| span.id == 2).unwrap();
            prop_assert!(child.timestamp.unwrap() >= parent_timestamp);
        }
    }
}
