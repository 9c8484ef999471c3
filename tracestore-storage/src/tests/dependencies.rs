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

use tracestore_model::{BinaryAnnotation, DependencyLink, Endpoint, Span};

use super::{annotation, DefaultForTest, END_TS_MICROS, END_TS_MILLIS};
use crate::SpanStore;

/// A trace in which `app1` calls `app2`, which calls an uninstrumented `db`
/// known only through its server address.
fn call_trace(trace_id: i64, start_timestamp: i64, error_on_db_call: bool) -> Vec<Span> {
    let root = Span::builder(trace_id, 1)
        .name("call")
        .annotation(annotation(start_timestamp, "cs", "app1"))
        .annotation(annotation(start_timestamp + 10, "sr", "app2"))
        .annotation(annotation(start_timestamp + 90, "ss", "app2"))
        .annotation(annotation(start_timestamp + 100, "cr", "app1"))
        .build();
    let mut db_call = Span::builder(trace_id, 2)
        .parent_id(1)
        .name("query")
        .annotation(annotation(start_timestamp + 20, "cs", "app2"))
        .annotation(annotation(start_timestamp + 80, "cr", "app2"))
        .binary_annotation(BinaryAnnotation::address("sa", Endpoint::new("db", 0)));
    if error_on_db_call {
        db_call = db_call.binary_annotation(BinaryAnnotation::string("error", "timeout", None));
    }
    vec![root, db_call.build()]
}

fn link(parent: &str, child: &str, call_count: i64, error_count: i64) -> DependencyLink {
    DependencyLink {
        parent: parent.to_string(),
        child: child.to_string(),
        call_count,
        error_count,
    }
}

pub(crate) async fn test_dependency_links<S: SpanStore + DefaultForTest>() {
    let store = S::default_for_test().await;
    store
        .accept(call_trace(1, END_TS_MICROS - 10_000, false))
        .await
        .unwrap();
    let links = store
        .get_dependencies(END_TS_MILLIS, Some(3_600_000))
        .await
        .unwrap();
    assert_eq!(
        links,
        vec![link("app1", "app2", 1, 0), link("app2", "db", 1, 0)]
    );
}

pub(crate) async fn test_dependency_links_window<S: SpanStore + DefaultForTest>() {
    let store = S::default_for_test().await;
    store
        .accept(call_trace(1, END_TS_MICROS - 10_000, false))
        .await
        .unwrap();
    // One day older: outside a one-hour lookback.
    store
        .accept(call_trace(2, END_TS_MICROS - 86_400_000_000, false))
        .await
        .unwrap();
    let links = store
        .get_dependencies(END_TS_MILLIS, Some(3_600_000))
        .await
        .unwrap();
    assert_eq!(
        links,
        vec![link("app1", "app2", 1, 0), link("app2", "db", 1, 0)]
    );

    let links = store
        .get_dependencies(END_TS_MILLIS, Some(2 * 86_400_000))
        .await
        .unwrap();
    assert_eq!(
        links,
        vec![link("app1", "app2", 2, 0), link("app2", "db", 2, 0)]
    );
}

pub(crate) async fn test_dependency_links_error_count<S: SpanStore + DefaultForTest>() {
    let store = S::default_for_test().await;
    store
        .accept(call_trace(1, END_TS_MICROS - 10_000, true))
        .await
        .unwrap();
    let links = store
        .get_dependencies(END_TS_MILLIS, Some(3_600_000))
        .await
        .unwrap();
    assert_eq!(
        links,
        vec![link("app1", "app2", 1, 0), link("app2", "db", 1, 1)]
    );
}
