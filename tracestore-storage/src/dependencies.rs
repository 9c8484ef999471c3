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

//! Derives aggregated service-to-service call edges from traces.
//!
//! Traces are often incomplete: a span may only carry the client half of a
//! call, a downstream service may be uninstrumented and known only through a
//! `sa` address annotation, and local spans sit between remote calls. The
//! linker reconstructs each trace's parent/child tree from whatever spans
//! are present and classifies one edge per remote span.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracestore_model::constants::{CLIENT_ADDR, CLIENT_SEND, ERROR, SERVER_ADDR, SERVER_RECV};
use tracestore_model::{DependencyLink, Span};

/// The link-relevant projection of a span.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyLinkSpan {
    pub parent_id: Option<i64>,
    pub span_id: i64,
    /// Service of the `sr` annotation endpoint: the span ran on the server.
    pub sr_service: Option<String>,
    /// Service of the `ca` address, falling back to the `cs` annotation
    /// endpoint. The client address is more authoritative than the client
    /// send owner.
    pub ca_service: Option<String>,
    /// Service of the `sa` address: the callee, possibly uninstrumented.
    pub sa_service: Option<String>,
    /// Whether the span was flagged with an `error` annotation or key.
    pub error: bool,
}

impl DependencyLinkSpan {
    /// Returns a builder for the span of the given identity.
    pub fn builder(parent_id: Option<i64>, span_id: i64) -> DependencyLinkSpanBuilder {
        DependencyLinkSpanBuilder {
            parent_id,
            span_id,
            sr_service: None,
            ca_service: None,
            sa_service: None,
            cs_service: None,
            error: false,
        }
    }

    /// Projects a merged span down to its link-relevant fields.
    pub fn from_span(span: &Span) -> DependencyLinkSpan {
        let mut builder = DependencyLinkSpan::builder(span.parent_id, span.id);
        for annotation in &span.annotations {
            let endpoint_service = annotation
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.service_name.as_str());
            match annotation.value.as_str() {
                SERVER_RECV => builder.record_sr_service(endpoint_service),
                CLIENT_SEND => builder.record_cs_service(endpoint_service),
                ERROR => builder.record_error(),
                _ => {}
            }
        }
        for binary_annotation in &span.binary_annotations {
            let endpoint_service = binary_annotation
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.service_name.as_str());
            match binary_annotation.key.as_str() {
                CLIENT_ADDR => builder.record_ca_service(endpoint_service),
                SERVER_ADDR => builder.record_sa_service(endpoint_service),
                ERROR => builder.record_error(),
                _ => {}
            }
        }
        builder.build()
    }

    fn is_remote(&self) -> bool {
        self.sr_service.is_some() || self.sa_service.is_some()
    }
}

/// Builder for [`DependencyLinkSpan`], also used by the relational store to
/// assemble link spans directly from annotation rows.
#[derive(Debug)]
pub struct DependencyLinkSpanBuilder {
    parent_id: Option<i64>,
    span_id: i64,
    sr_service: Option<String>,
    ca_service: Option<String>,
    sa_service: Option<String>,
    cs_service: Option<String>,
    error: bool,
}

impl DependencyLinkSpanBuilder {
    pub fn record_sr_service(&mut self, service_name: Option<&str>) {
        record_first(&mut self.sr_service, service_name);
    }

    pub fn record_ca_service(&mut self, service_name: Option<&str>) {
        record_first(&mut self.ca_service, service_name);
    }

    pub fn record_sa_service(&mut self, service_name: Option<&str>) {
        record_first(&mut self.sa_service, service_name);
    }

    pub fn record_cs_service(&mut self, service_name: Option<&str>) {
        record_first(&mut self.cs_service, service_name);
    }

    pub fn record_error(&mut self) {
        self.error = true;
    }

    pub fn build(self) -> DependencyLinkSpan {
        DependencyLinkSpan {
            parent_id: self.parent_id,
            span_id: self.span_id,
            sr_service: self.sr_service,
            ca_service: self.ca_service.or(self.cs_service),
            sa_service: self.sa_service,
            error: self.error,
        }
    }
}

fn record_first(slot: &mut Option<String>, service_name: Option<&str>) {
    if slot.is_none() {
        if let Some(service_name) = service_name.filter(|service_name| !service_name.is_empty()) {
            *slot = Some(service_name.to_string());
        }
    }
}

/// Aggregates dependency links across traces.
///
/// Feed it one trace at a time with [`put_trace`](Self::put_trace), then
/// consume the sorted links with [`link`](Self::link).
#[derive(Debug, Default)]
pub struct DependencyLinker {
    call_counts: BTreeMap<(String, String), (i64, i64)>,
}

impl DependencyLinker {
    pub fn new() -> DependencyLinker {
        DependencyLinker::default()
    }

    /// Classifies the spans of one trace and accumulates their edges.
    pub fn put_trace<I>(&mut self, spans: I)
    where
        I: IntoIterator<Item = DependencyLinkSpan>,
    {
        let spans: Vec<DependencyLinkSpan> = spans
            .into_iter()
            // A span claiming itself as parent is bad instrumentation.
            .filter(|span| span.parent_id != Some(span.span_id))
            .collect();
        if spans.iter().filter(|span| span.is_remote()).count() < 2 {
            return;
        }
        let span_by_id: HashMap<i64, &DependencyLinkSpan> =
            spans.iter().map(|span| (span.span_id, span)).collect();
        for span in &spans {
            let (client, server, error) = match &span.sr_service {
                Some(sr_service) => {
                    let client = ancestor_service(span, &span_by_id)
                        .or_else(|| span.ca_service.clone());
                    (client, sr_service.clone(), span.error)
                }
                // A client-side observation of an uninstrumented downstream.
                None => match (&span.ca_service, &span.sa_service) {
                    (Some(ca_service), Some(sa_service)) => {
                        (Some(ca_service.clone()), sa_service.clone(), span.error)
                    }
                    // A local span: skipped, but its subtree is still
                    // traversable through the ancestor walk.
                    _ => continue,
                },
            };
            if let Some(client) = client {
                let (call_count, error_count) = self
                    .call_counts
                    .entry((client, server))
                    .or_insert((0, 0));
                *call_count += 1;
                if error {
                    *error_count += 1;
                }
            }
        }
    }

    /// Returns the accumulated links, sorted by `(parent, child)`.
    pub fn link(self) -> Vec<DependencyLink> {
        self.call_counts
            .into_iter()
            .map(|((parent, child), (call_count, error_count))| DependencyLink {
                parent,
                child,
                call_count,
                error_count,
            })
            .collect()
    }
}

/// Resolves the calling service of a server span: the nearest ancestor that
/// names a service, skipping local spans in between.
fn ancestor_service(
    span: &DependencyLinkSpan,
    span_by_id: &HashMap<i64, &DependencyLinkSpan>,
) -> Option<String> {
    let mut visited: HashSet<i64> = HashSet::new();
    let mut parent_id = span.parent_id;
    while let Some(ancestor_id) = parent_id {
        if !visited.insert(ancestor_id) {
            break;
        }
        let ancestor = span_by_id.get(&ancestor_id)?;
        if let Some(sr_service) = &ancestor.sr_service {
            return Some(sr_service.clone());
        }
        if let Some(ca_service) = &ancestor.ca_service {
            return Some(ca_service.clone());
        }
        parent_id = ancestor.parent_id;
    }
    None
}
