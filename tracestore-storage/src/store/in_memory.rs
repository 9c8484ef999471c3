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

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use itertools::Itertools;
use tracestore_model::{DependencyLink, QueryRequest, Span, StoreResult};
use tracing::debug;

use crate::dependencies::{DependencyLinkSpan, DependencyLinker};
use crate::trace::{matches_query, reconstruct_trace, sort_traces_descending};
use crate::SpanStore;

/// Entry of the service index, ordered by timestamp descending with the
/// trace id as tiebreaker. Identical `(trace_id, timestamp)` pairs collapse
/// under set semantics, which is what makes re-accepting a batch idempotent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct TraceIdByTimestamp {
    trace_id: i64,
    timestamp: i64,
}

impl Ord for TraceIdByTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.trace_id.cmp(&self.trace_id))
    }
}

impl PartialOrd for TraceIdByTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Indexes {
    /// Spans per trace, in insertion order. Duplicate reports are kept as-is
    /// and merged on read.
    trace_index: HashMap<i64, Vec<Span>>,
    /// Per service, the traces it participated in, most recent first. Spans
    /// without a timestamp index at `i64::MIN` so they sort last.
    service_to_traces: HashMap<String, BTreeSet<TraceIdByTimestamp>>,
    service_to_span_names: HashMap<String, BTreeSet<String>>,
    accepted_span_count: usize,
}

impl Indexes {
    fn get_raw_trace(&self, trace_id: i64) -> Option<Vec<Span>> {
        self.trace_index
            .get(&trace_id)
            .filter(|spans| !spans.is_empty())
            .cloned()
    }

    fn get_trace(&self, trace_id: i64) -> Option<Vec<Span>> {
        self.get_raw_trace(trace_id).map(reconstruct_trace)
    }
}

/// Span store backed by three in-process indexes, serialized under a single
/// mutex so a query never observes a trace in one index but not another.
///
/// This store is meant for tests, development, and as the write-through
/// cache of the relational backend. It never reports `Unavailable`.
#[derive(Default)]
pub struct InMemorySpanStore {
    indexes: Mutex<Indexes>,
}

impl InMemorySpanStore {
    /// Creates an empty store.
    pub fn new() -> InMemorySpanStore {
        InMemorySpanStore::default()
    }

    /// Number of spans accepted since creation, duplicates included.
    pub fn accepted_span_count(&self) -> usize {
        self.indexes.lock().unwrap().accepted_span_count
    }

    /// All known trace ids, ascending.
    pub fn trace_ids(&self) -> Vec<i64> {
        self.indexes
            .lock()
            .unwrap()
            .trace_index
            .keys()
            .copied()
            .sorted()
            .collect()
    }

    /// Drops every indexed span. The accepted span count is preserved.
    pub fn clear(&self) {
        let mut indexes = self.indexes.lock().unwrap();
        indexes.trace_index.clear();
        indexes.service_to_traces.clear();
        indexes.service_to_span_names.clear();
    }

    /// Returns the merged, skew-corrected traces for the given ids, skipping
    /// unknown ones. Unlike [`SpanStore::get_trace`] this is synchronous: the
    /// relational backend calls it on its write path.
    pub fn get_traces_by_ids(&self, trace_ids: &[i64]) -> Vec<Vec<Span>> {
        let indexes = self.indexes.lock().unwrap();
        trace_ids
            .iter()
            .filter_map(|&trace_id| indexes.get_trace(trace_id))
            .collect()
    }
}

#[async_trait]
impl SpanStore for InMemorySpanStore {
    async fn accept(&self, spans: Vec<Span>) -> StoreResult<()> {
        let mut indexes = self.indexes.lock().unwrap();
        for span in spans {
            // Spans are stored as reported; the normalized timestamp only
            // drives the service index ordering.
            let normalized_timestamp = span.timestamp.or_else(|| {
                span.annotations
                    .iter()
                    .map(|annotation| annotation.timestamp)
                    .min()
            });
            let timestamp_entry = TraceIdByTimestamp {
                trace_id: span.trace_id,
                timestamp: normalized_timestamp.unwrap_or(i64::MIN),
            };
            for service_name in span.service_names() {
                indexes
                    .service_to_traces
                    .entry(service_name.clone())
                    .or_default()
                    .insert(timestamp_entry);
                indexes
                    .service_to_span_names
                    .entry(service_name)
                    .or_default()
                    .insert(span.name.clone());
            }
            indexes.trace_index.entry(span.trace_id).or_default().push(span);
            indexes.accepted_span_count += 1;
        }
        Ok(())
    }

    async fn get_traces(&self, request: QueryRequest) -> StoreResult<Vec<Vec<Span>>> {
        request.validate()?;
        let service_name = request.service_name.to_ascii_lowercase();
        let indexes = self.indexes.lock().unwrap();
        let Some(timestamp_entries) = indexes.service_to_traces.get(&service_name) else {
            return Ok(Vec::new());
        };
        let mut seen_trace_ids: HashSet<i64> = HashSet::new();
        let mut traces: Vec<Vec<Span>> = Vec::new();
        // The index is already timestamp-descending, so the limit can be
        // applied while scanning.
        for timestamp_entry in timestamp_entries {
            if !seen_trace_ids.insert(timestamp_entry.trace_id) {
                continue;
            }
            let Some(trace) = indexes.get_trace(timestamp_entry.trace_id) else {
                continue;
            };
            if matches_query(&request, &trace) {
                traces.push(trace);
                if traces.len() == request.limit {
                    break;
                }
            }
        }
        sort_traces_descending(&mut traces);
        debug!(
            service_name = %service_name,
            num_traces = traces.len(),
            "in-memory trace query"
        );
        Ok(traces)
    }

    async fn get_trace(&self, trace_id: i64) -> StoreResult<Option<Vec<Span>>> {
        Ok(self.indexes.lock().unwrap().get_trace(trace_id))
    }

    async fn get_raw_trace(&self, trace_id: i64) -> StoreResult<Option<Vec<Span>>> {
        Ok(self.indexes.lock().unwrap().get_raw_trace(trace_id))
    }

    async fn get_service_names(&self) -> StoreResult<Vec<String>> {
        let indexes = self.indexes.lock().unwrap();
        let service_names = indexes
            .service_to_traces
            .keys()
            .cloned()
            .sorted()
            .collect();
        Ok(service_names)
    }

    async fn get_span_names(&self, service_name: &str) -> StoreResult<Vec<String>> {
        let service_name = service_name.to_ascii_lowercase();
        let indexes = self.indexes.lock().unwrap();
        let span_names = indexes
            .service_to_span_names
            .get(&service_name)
            .map(|span_names| span_names.iter().cloned().collect())
            .unwrap_or_default();
        Ok(span_names)
    }

    async fn get_dependencies(
        &self,
        end_ts: i64,
        lookback: Option<i64>,
    ) -> StoreResult<Vec<DependencyLink>> {
        let end_ts_micros = end_ts * 1_000;
        let lookback_micros = lookback.map(|lookback| lookback * 1_000).unwrap_or(end_ts_micros);
        let indexes = self.indexes.lock().unwrap();
        let mut linker = DependencyLinker::new();
        for trace in indexes.trace_index.values() {
            if trace.is_empty() {
                continue;
            }
            let merged_spans = reconstruct_trace(trace.clone());
            let link_spans: Vec<DependencyLinkSpan> = merged_spans
                .iter()
                .filter(|span| {
                    span.timestamp.map_or(false, |timestamp| {
                        timestamp >= end_ts_micros - lookback_micros && timestamp <= end_ts_micros
                    })
                })
                .map(DependencyLinkSpan::from_span)
                .collect();
            linker.put_trace(link_spans);
        }
        Ok(linker.link())
    }
}
