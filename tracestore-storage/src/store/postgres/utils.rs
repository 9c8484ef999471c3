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

use std::fmt::Write;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgDatabaseError, PgPoolOptions};
use sqlx::{ConnectOptions, Pool, Postgres};
use tracestore_model::{AnnotationType, QueryRequest, StoreError, StoreResult};
use tracing::error;
use tracing::log::LevelFilter;

use super::PLAIN_ANNOTATION_TYPE;
use crate::config::PostgresStoreConfig;

// https://www.postgresql.org/docs/current/errcodes-appendix.html
mod pg_error_code {
    pub const UNDEFINED_COLUMN: &str = "42703";
    pub const UNDEFINED_TABLE: &str = "42P01";
}

/// Establishes a connection pool to the given database URI.
pub(super) async fn establish_connection(
    postgres_store_config: &PostgresStoreConfig,
    connection_uri: &str,
) -> StoreResult<Pool<Postgres>> {
    let invalid_config = |error: anyhow::Error| StoreError::InvalidArgument {
        message: error.to_string(),
    };
    let acquire_timeout = postgres_store_config
        .acquire_connection_timeout()
        .map_err(invalid_config)?;
    let idle_timeout_opt = postgres_store_config
        .idle_connection_timeout_opt()
        .map_err(invalid_config)?;
    let max_lifetime_opt = postgres_store_config
        .max_connection_lifetime_opt()
        .map_err(invalid_config)?;
    let pool_options = PgPoolOptions::new()
        .min_connections(postgres_store_config.min_connections as u32)
        .max_connections(postgres_store_config.max_connections.get() as u32)
        .acquire_timeout(acquire_timeout)
        .idle_timeout(idle_timeout_opt)
        .max_lifetime(max_lifetime_opt);
    let connect_options: PgConnectOptions = PgConnectOptions::from_str(connection_uri)
        .map_err(|error| StoreError::InvalidArgument {
            message: format!("invalid connection URI: {error}"),
        })?
        .application_name("tracestore-storage")
        .log_statements(LevelFilter::Debug);
    pool_options
        .connect_with(connect_options)
        .await
        .map_err(|error| {
            error!(error=?error, "failed to establish connection to database");
            StoreError::Unavailable {
                message: error.to_string(),
            }
        })
}

pub(super) fn convert_sqlx_err(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable {
                message: error.to_string(),
            }
        }
        sqlx::Error::Database(database_error) => {
            let pg_database_error = database_error.downcast_ref::<PgDatabaseError>();
            match pg_database_error.code() {
                pg_error_code::UNDEFINED_TABLE | pg_error_code::UNDEFINED_COLUMN => {
                    StoreError::Corrupt {
                        message: pg_database_error.to_string(),
                    }
                }
                _ => StoreError::Internal {
                    message: "database error".to_string(),
                    cause: pg_database_error.to_string(),
                },
            }
        }
        _ => {
            error!(error=?error, "an error occurred in a database operation");
            StoreError::Internal {
                message: "database error".to_string(),
                cause: error.to_string(),
            }
        }
    }
}

/// A user-supplied value bound into a dynamically built query. Numeric
/// filters are inlined instead: they come from typed fields and cannot
/// inject.
pub(super) enum QueryValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// Builds the trace-id search query: one self-join of `annotations` per
/// requested annotation and per requested string binary annotation, all tied
/// to the same span row, most recently started traces first.
pub(super) fn build_trace_id_query(request: &QueryRequest) -> (String, Vec<QueryValue>) {
    let end_ts_micros = request.end_ts * 1_000;
    let start_ts_micros = end_ts_micros - request.lookback * 1_000;

    let mut values: Vec<QueryValue> =
        vec![QueryValue::Text(request.service_name.to_ascii_lowercase())];
    let mut sql = "SELECT spans.trace_id FROM spans JOIN annotations \
                   ON spans.trace_id = annotations.trace_id AND spans.id = annotations.span_id"
        .to_string();

    let mut alias_index = 0;
    for (key, value) in &request.binary_annotations {
        values.push(QueryValue::Text(key.clone()));
        let key_placeholder = values.len();
        values.push(QueryValue::Bytes(value.as_bytes().to_vec()));
        let value_placeholder = values.len();
        let _ = write!(
            sql,
            " JOIN annotations AS a{alias_index} ON spans.trace_id = a{alias_index}.trace_id \
             AND spans.id = a{alias_index}.span_id AND a{alias_index}.a_type = {string_type} \
             AND a{alias_index}.a_key = ${key_placeholder} \
             AND a{alias_index}.a_value = ${value_placeholder}",
            string_type = AnnotationType::String.value(),
        );
        alias_index += 1;
    }
    for key in &request.annotations {
        values.push(QueryValue::Text(key.clone()));
        let key_placeholder = values.len();
        let _ = write!(
            sql,
            " JOIN annotations AS a{alias_index} ON spans.trace_id = a{alias_index}.trace_id \
             AND spans.id = a{alias_index}.span_id \
             AND a{alias_index}.a_type = {PLAIN_ANNOTATION_TYPE} \
             AND a{alias_index}.a_key = ${key_placeholder}",
        );
        alias_index += 1;
    }

    let _ = write!(
        sql,
        " WHERE annotations.endpoint_service_name = $1 \
         AND spans.start_ts BETWEEN {start_ts_micros} AND {end_ts_micros}"
    );
    if let Some(span_name) = &request.span_name {
        values.push(QueryValue::Text(span_name.to_ascii_lowercase()));
        let name_placeholder = values.len();
        let _ = write!(sql, " AND spans.name = ${name_placeholder}");
    }
    match (request.min_duration, request.max_duration) {
        (Some(min_duration), Some(max_duration)) => {
            let _ = write!(
                sql,
                " AND spans.duration BETWEEN {min_duration} AND {max_duration}"
            );
        }
        (Some(min_duration), None) => {
            let _ = write!(sql, " AND spans.duration >= {min_duration}");
        }
        _ => {}
    }
    let _ = write!(
        sql,
        " GROUP BY spans.trace_id ORDER BY MAX(spans.start_ts) DESC LIMIT {limit}",
        limit = request.limit
    );
    (sql, values)
}

/// Builds the dependency-link row query over a time window. Only the
/// annotation keys relevant to link derivation are joined in.
pub(super) fn build_dependency_link_query(end_ts_micros: i64, lookback_micros: Option<i64>) -> String {
    let mut sql = "SELECT DISTINCT spans.trace_id, spans.parent_id, spans.id, \
                   annotations.a_key, annotations.endpoint_service_name \
                   FROM spans LEFT JOIN annotations \
                   ON spans.trace_id = annotations.trace_id AND spans.id = annotations.span_id \
                   AND annotations.a_key IN ('ca', 'cs', 'error', 'sa', 'sr')"
        .to_string();
    match lookback_micros {
        Some(lookback_micros) => {
            let start_ts_micros = end_ts_micros - lookback_micros;
            let _ = write!(
                sql,
                " WHERE spans.start_ts BETWEEN {start_ts_micros} AND {end_ts_micros}"
            );
        }
        None => {
            let _ = write!(sql, " WHERE spans.start_ts <= {end_ts_micros}");
        }
    }
    sql.push_str(" ORDER BY spans.trace_id");
    sql
}
