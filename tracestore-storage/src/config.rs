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

//! Backend selection and tuning knobs, deserialized from the `span_store`
//! section of node config files.

use std::num::NonZeroUsize;
use std::ops::Deref;
use std::time::Duration;

use anyhow::{ensure, Context};
use humantime::parse_duration;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, EnumMap};

/// The storage backends a span store can run on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStoreBackend {
    InMemory,
    #[serde(alias = "pg", alias = "postgres")]
    PostgreSQL,
}

/// Holds the span store configurations defined in the `span_store` section
/// of node config files.
///
/// ```yaml
/// span_store:
///   in_memory: {}
///
///   postgres:
///     max_connections: 12
/// ```
#[serde_as]
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpanStoreConfigs(#[serde_as(as = "EnumMap")] Vec<SpanStoreConfig>);

impl SpanStoreConfigs {
    pub fn validate(&self) -> anyhow::Result<()> {
        for span_store_config in &self.0 {
            span_store_config.validate()?;
        }
        let backends: Vec<SpanStoreBackend> = self
            .0
            .iter()
            .map(|span_store_config| span_store_config.backend())
            .sorted()
            .collect();

        for (left, right) in backends.iter().zip(backends.iter().skip(1)) {
            ensure!(
                left != right,
                "{left:?} span store config is defined multiple times"
            );
        }
        Ok(())
    }

    pub fn find_in_memory(&self) -> Option<&InMemoryStoreConfig> {
        self.0
            .iter()
            .find_map(|span_store_config| match span_store_config {
                SpanStoreConfig::InMemory(in_memory_store_config) => Some(in_memory_store_config),
                _ => None,
            })
    }

    pub fn find_postgres(&self) -> Option<&PostgresStoreConfig> {
        self.0
            .iter()
            .find_map(|span_store_config| match span_store_config {
                SpanStoreConfig::PostgreSQL(postgres_store_config) => Some(postgres_store_config),
                _ => None,
            })
    }
}

impl Deref for SpanStoreConfigs {
    type Target = Vec<SpanStoreConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStoreConfig {
    InMemory(InMemoryStoreConfig),
    #[serde(alias = "pg", alias = "postgres")]
    PostgreSQL(PostgresStoreConfig),
}

impl SpanStoreConfig {
    pub fn backend(&self) -> SpanStoreBackend {
        match self {
            Self::InMemory(_) => SpanStoreBackend::InMemory,
            Self::PostgreSQL(_) => SpanStoreBackend::PostgreSQL,
        }
    }

    pub fn as_postgres(&self) -> Option<&PostgresStoreConfig> {
        match self {
            Self::PostgreSQL(postgres_store_config) => Some(postgres_store_config),
            _ => None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Self::InMemory(in_memory_store_config) => in_memory_store_config.validate()?,
            Self::PostgreSQL(postgres_store_config) => postgres_store_config.validate()?,
        }
        Ok(())
    }
}

impl From<InMemoryStoreConfig> for SpanStoreConfig {
    fn from(in_memory_store_config: InMemoryStoreConfig) -> Self {
        Self::InMemory(in_memory_store_config)
    }
}

impl From<PostgresStoreConfig> for SpanStoreConfig {
    fn from(postgres_store_config: PostgresStoreConfig) -> Self {
        Self::PostgreSQL(postgres_store_config)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresStoreConfig {
    #[serde(default = "PostgresStoreConfig::default_min_connections")]
    pub min_connections: usize,
    #[serde(
        alias = "max_num_connections",
        default = "PostgresStoreConfig::default_max_connections"
    )]
    pub max_connections: NonZeroUsize,
    #[serde(default = "PostgresStoreConfig::default_acquire_connection_timeout")]
    pub acquire_connection_timeout: String,
    #[serde(default = "PostgresStoreConfig::default_idle_connection_timeout")]
    pub idle_connection_timeout: String,
    #[serde(default = "PostgresStoreConfig::default_max_connection_lifetime")]
    pub max_connection_lifetime: String,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            min_connections: Self::default_min_connections(),
            max_connections: Self::default_max_connections(),
            acquire_connection_timeout: Self::default_acquire_connection_timeout(),
            idle_connection_timeout: Self::default_idle_connection_timeout(),
            max_connection_lifetime: Self::default_max_connection_lifetime(),
        }
    }
}

impl PostgresStoreConfig {
    fn default_min_connections() -> usize {
        0
    }

    fn default_max_connections() -> NonZeroUsize {
        NonZeroUsize::new(10).expect("10 should be non-zero")
    }

    fn default_acquire_connection_timeout() -> String {
        "10s".to_string()
    }

    fn default_idle_connection_timeout() -> String {
        "10min".to_string()
    }

    fn default_max_connection_lifetime() -> String {
        "30min".to_string()
    }

    pub fn acquire_connection_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.acquire_connection_timeout).with_context(|| {
            format!(
                "failed to parse `acquire_connection_timeout` value `{}`",
                self.acquire_connection_timeout
            )
        })
    }

    pub fn idle_connection_timeout_opt(&self) -> anyhow::Result<Option<Duration>> {
        parse_duration_opt(&self.idle_connection_timeout)
            .with_context(|| {
                format!(
                    "failed to parse `idle_connection_timeout` value `{}`",
                    self.idle_connection_timeout
                )
            })
    }

    pub fn max_connection_lifetime_opt(&self) -> anyhow::Result<Option<Duration>> {
        parse_duration_opt(&self.max_connection_lifetime)
            .with_context(|| {
                format!(
                    "failed to parse `max_connection_lifetime` value `{}`",
                    self.max_connection_lifetime
                )
            })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.min_connections <= self.max_connections.get(),
            "`min_connections` must be less than or equal to `max_connections`"
        );
        self.acquire_connection_timeout()?;
        self.idle_connection_timeout_opt()?;
        self.max_connection_lifetime_opt()?;
        Ok(())
    }
}

/// An empty or `0` duration disables the corresponding timeout.
fn parse_duration_opt(duration: &str) -> anyhow::Result<Option<Duration>> {
    if duration.is_empty() || duration == "0" {
        return Ok(None);
    }
    let duration = parse_duration(duration)?;
    if duration.is_zero() {
        Ok(None)
    } else {
        Ok(Some(duration))
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemoryStoreConfig;

impl InMemoryStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_store_configs_serde() {
        let span_store_configs_yaml = "";
        let span_store_configs: SpanStoreConfigs =
            serde_yaml::from_str(span_store_configs_yaml).unwrap();
        assert!(span_store_configs.is_empty());

        let span_store_configs_yaml = r#"
                postgres:
                    max_connections: 12
            "#;
        let span_store_configs: SpanStoreConfigs =
            serde_yaml::from_str(span_store_configs_yaml).unwrap();

        let expected_span_store_configs = SpanStoreConfigs(vec![
            PostgresStoreConfig {
                max_connections: NonZeroUsize::new(12).unwrap(),
                ..Default::default()
            }
            .into(),
        ]);
        assert_eq!(span_store_configs, expected_span_store_configs);
    }

    #[test]
    fn test_span_store_configs_validate() {
        let span_store_configs = SpanStoreConfigs(vec![
            PostgresStoreConfig::default().into(),
            PostgresStoreConfig::default().into(),
        ]);
        let error = span_store_configs.validate().unwrap_err();
        assert!(error.to_string().contains("defined multiple times"));

        let span_store_configs = SpanStoreConfigs(vec![
            PostgresStoreConfig {
                acquire_connection_timeout: "15".to_string(),
                ..Default::default()
            }
            .into(),
        ]);
        let error = span_store_configs.validate().unwrap_err();
        assert!(error.to_string().contains("`acquire_connection_timeout`"));
    }

    #[test]
    fn test_postgres_store_config_serde() {
        let postgres_store_config_yaml = "";
        let postgres_store_config: PostgresStoreConfig =
            serde_yaml::from_str(postgres_store_config_yaml).unwrap();
        assert_eq!(postgres_store_config, PostgresStoreConfig::default());

        let postgres_store_config_yaml = r#"
                min_connections: 6
                max_connections: 12
                acquire_connection_timeout: 500ms
                idle_connection_timeout: 1h
                max_connection_lifetime: 1d
            "#;
        let postgres_store_config: PostgresStoreConfig =
            serde_yaml::from_str(postgres_store_config_yaml).unwrap();

        let expected_postgres_store_config = PostgresStoreConfig {
            min_connections: 6,
            max_connections: NonZeroUsize::new(12).unwrap(),
            acquire_connection_timeout: "500ms".to_string(),
            idle_connection_timeout: "1h".to_string(),
            max_connection_lifetime: "1d".to_string(),
        };
        assert_eq!(postgres_store_config, expected_postgres_store_config);
        assert_eq!(
            postgres_store_config.acquire_connection_timeout().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            postgres_store_config.idle_connection_timeout_opt().unwrap(),
            Some(Duration::from_secs(3_600))
        );
        assert_eq!(
            postgres_store_config.max_connection_lifetime_opt().unwrap(),
            Some(Duration::from_secs(24 * 3_600))
        );
    }

    #[test]
    fn test_postgres_store_config_disabled_timeouts() {
        let postgres_store_config_yaml = r#"
                idle_connection_timeout: ""
                max_connection_lifetime: 0
            "#;
        let postgres_store_config: PostgresStoreConfig =
            serde_yaml::from_str(postgres_store_config_yaml).unwrap();
        assert!(postgres_store_config
            .idle_connection_timeout_opt()
            .unwrap()
            .is_none());
        assert!(postgres_store_config
            .max_connection_lifetime_opt()
            .unwrap()
            .is_none());
    }
}
