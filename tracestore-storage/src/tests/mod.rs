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

//! The backend-agnostic test suite, instantiated per backend through
//! [`span_store_test_suite!`](crate::span_store_test_suite).

use async_trait::async_trait;
use tracestore_model::{Annotation, Endpoint};

use crate::InMemorySpanStore;

pub(crate) mod dependencies;

/// Window end shared by the suite fixtures, in milliseconds since epoch
/// (2020-01-01T00:00:00Z).
pub(crate) const END_TS_MILLIS: i64 = 1_577_836_800_000;

/// Same instant in microseconds, the unit spans are recorded in.
pub(crate) const END_TS_MICROS: i64 = END_TS_MILLIS * 1_000;

#[async_trait]
pub trait DefaultForTest {
    async fn default_for_test() -> Self;
}

#[async_trait]
impl DefaultForTest for InMemorySpanStore {
    async fn default_for_test() -> Self {
        InMemorySpanStore::new()
    }
}

pub(crate) fn endpoint(service_name: &str) -> Option<Endpoint> {
    Some(Endpoint::new(service_name, 127 << 24 | 1))
}

pub(crate) fn annotation(timestamp: i64, value: &str, service_name: &str) -> Annotation {
    Annotation::new(timestamp, value, endpoint(service_name))
}

/// Instantiates the backend-agnostic test suite for a store type
/// implementing [`DefaultForTest`](crate::tests::DefaultForTest).
#[macro_export]
macro_rules! span_store_test_suite {
    ($store_type:ty) => {
        #[cfg(test)]
        mod common_tests {

            #[tokio::test]
            #[serial_test::serial]
            async fn test_accept_empty_batch() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_accept_empty_batch::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_single_trace_round_trip() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_single_trace_round_trip::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_merge_across_reporters() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_merge_across_reporters::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_query_by_binary_annotation() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_query_by_binary_annotation::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_limit_and_order() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_limit_and_order::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_clock_skew_correction() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_clock_skew_correction::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_accept_idempotent() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_accept_idempotent::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_query_limit_monotonic() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_query_limit_monotonic::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_query_rejects_invalid_requests() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_query_rejects_invalid_requests::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_service_name_case_insensitive() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_service_name_case_insensitive::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_trace_with_null_root_timestamp() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_trace_with_null_root_timestamp::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_raw_trace_binary_annotations_sorted_by_key() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_raw_trace_binary_annotations_sorted_by_key::<$store_type>()
                    .await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_unknown_trace_returns_none() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::store::test_unknown_trace_returns_none::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_dependency_links() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::dependencies::test_dependency_links::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_dependency_links_window() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::dependencies::test_dependency_links_window::<$store_type>().await;
            }

            #[tokio::test]
            #[serial_test::serial]
            async fn test_dependency_links_error_count() {
                let _ = tracing_subscriber::fmt::try_init();
                $crate::tests::dependencies::test_dependency_links_error_count::<$store_type>()
                    .await;
            }
        }
    };
}
