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
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The network context of a service recording an annotation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Service name, always ASCII-lowercase.
    pub service_name: String,
    /// IPv4 address of the host, packed into a big-endian `i32`.
    pub ipv4: i32,
    /// Listening port, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i16>,
}

impl Endpoint {
    /// Creates an endpoint, lowercasing the service name.
    pub fn new(service_name: impl Into<String>, ipv4: i32) -> Self {
        Endpoint {
            service_name: service_name.into().to_ascii_lowercase(),
            ipv4,
            port: None,
        }
    }

    /// Sets the listening port.
    pub fn with_port(mut self, port: i16) -> Self {
        self.port = Some(port);
        self
    }
}

/// A timestamped event on a span, such as the core `cs`/`sr`/`ss`/`cr`
/// annotations recorded by instrumentation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Microseconds since epoch at which the event occurred.
    pub timestamp: i64,
    /// Short event tag, usually one of the values in [`crate::constants`].
    pub value: String,
    /// The endpoint that recorded the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

impl Annotation {
    /// Creates an annotation.
    pub fn new(timestamp: i64, value: impl Into<String>, endpoint: Option<Endpoint>) -> Self {
        Annotation {
            timestamp,
            value: value.into(),
            endpoint,
        }
    }
}

impl Ord for Annotation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.endpoint.cmp(&other.endpoint))
    }
}

impl PartialOrd for Annotation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The wire type of a [`BinaryAnnotation`] value.
///
/// The discriminants are the codes persisted by the relational backend; `-1`
/// is reserved there for plain annotations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationType {
    Bool,
    Bytes,
    I16,
    I32,
    I64,
    Double,
    String,
}

impl AnnotationType {
    /// Returns the persisted type code.
    pub fn value(&self) -> i32 {
        match self {
            AnnotationType::Bool => 0,
            AnnotationType::Bytes => 1,
            AnnotationType::I16 => 2,
            AnnotationType::I32 => 3,
            AnnotationType::I64 => 4,
            AnnotationType::Double => 5,
            AnnotationType::String => 6,
        }
    }

    /// Resolves a persisted type code.
    pub fn from_value(value: i32) -> Option<AnnotationType> {
        match value {
            0 => Some(AnnotationType::Bool),
            1 => Some(AnnotationType::Bytes),
            2 => Some(AnnotationType::I16),
            3 => Some(AnnotationType::I32),
            4 => Some(AnnotationType::I64),
            5 => Some(AnnotationType::Double),
            6 => Some(AnnotationType::String),
            _ => None,
        }
    }
}

/// A key/typed-value pair on a span, used for tags and for the `ca`/`sa`
/// address annotations.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAnnotation {
    pub key: String,
    pub value: Vec<u8>,
    pub annotation_type: AnnotationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

impl BinaryAnnotation {
    /// Creates a binary annotation from raw bytes.
    pub fn new(
        key: impl Into<String>,
        value: Vec<u8>,
        annotation_type: AnnotationType,
        endpoint: Option<Endpoint>,
    ) -> Self {
        BinaryAnnotation {
            key: key.into(),
            value,
            annotation_type,
            endpoint,
        }
    }

    /// Creates a `STRING`-typed binary annotation, the shape used for tags.
    pub fn string(key: impl Into<String>, value: &str, endpoint: Option<Endpoint>) -> Self {
        BinaryAnnotation::new(key, value.as_bytes().to_vec(), AnnotationType::String, endpoint)
    }

    /// Creates an address annotation (`ca`/`sa`) marking `endpoint` as one
    /// side of the call. The value is the conventional single `true` byte.
    pub fn address(key: impl Into<String>, endpoint: Endpoint) -> Self {
        BinaryAnnotation::new(key, vec![1], AnnotationType::Bool, Some(endpoint))
    }
}

/// One unit of work within a trace, uniquely identified by
/// `(trace_id, id)`. Spans with the same identifier are partial reports from
/// different hosts and are merged on read.
///
/// Construct spans through [`Span::builder`], which lowercases the name and
/// keeps both annotation lists sorted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: i64,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Span name, lowercase. `""` and `"unknown"` both mean "not named yet".
    pub name: String,
    /// Start of the span in microseconds since epoch, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Duration in microseconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    /// Sorted by `(timestamp, value)` ascending.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Sorted by key ascending.
    #[serde(default)]
    pub binary_annotations: Vec<BinaryAnnotation>,
}

impl Span {
    /// Returns a builder for a span of the given identity.
    pub fn builder(trace_id: i64, id: i64) -> SpanBuilder {
        SpanBuilder {
            trace_id,
            id,
            parent_id: None,
            name: String::new(),
            timestamp: None,
            duration: None,
            debug: None,
            annotations: Vec::new(),
            binary_annotations: Vec::new(),
        }
    }

    /// Whether the span carries no usable name for merge precedence.
    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty() || self.name == "unknown"
    }

    /// Distinct service names across the endpoints of both annotation lists.
    pub fn service_names(&self) -> BTreeSet<String> {
        let annotation_endpoints = self
            .annotations
            .iter()
            .filter_map(|annotation| annotation.endpoint.as_ref());
        let binary_annotation_endpoints = self
            .binary_annotations
            .iter()
            .filter_map(|binary_annotation| binary_annotation.endpoint.as_ref());
        annotation_endpoints
            .chain(binary_annotation_endpoints)
            .filter(|endpoint| !endpoint.service_name.is_empty())
            .map(|endpoint| endpoint.service_name.clone())
            .collect()
    }
}

/// Builder for [`Span`].
#[derive(Debug)]
pub struct SpanBuilder {
    trace_id: i64,
    id: i64,
    parent_id: Option<i64>,
    name: String,
    timestamp: Option<i64>,
    duration: Option<i64>,
    debug: Option<bool>,
    annotations: Vec<Annotation>,
    binary_annotations: Vec<BinaryAnnotation>,
}

impl SpanBuilder {
    pub fn parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the span name, lowercased.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into().to_ascii_lowercase();
        self
    }

    /// Sets the start timestamp in microseconds since epoch.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the duration in microseconds.
    pub fn duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn binary_annotation(mut self, binary_annotation: BinaryAnnotation) -> Self {
        self.binary_annotations.push(binary_annotation);
        self
    }

    /// Builds the span, sorting annotations by `(timestamp, value)` and
    /// binary annotations by key. Both sorts are stable.
    pub fn build(self) -> Span {
        let mut annotations = self.annotations;
        annotations.sort();
        let mut binary_annotations = self.binary_annotations;
        binary_annotations.sort_by(|left, right| left.key.cmp(&right.key));
        Span {
            trace_id: self.trace_id,
            id: self.id,
            parent_id: self.parent_id,
            name: self.name,
            timestamp: self.timestamp,
            duration: self.duration,
            debug: self.debug,
            annotations,
            binary_annotations,
        }
    }
}
