//! Agent configuration

use anyhow::Result;
use autoscale_lib::collector::DEFAULT_DOCKER_PATH;
use autoscale_lib::dispatch::{DispatchQueueConfig, DEFAULT_ENDPOINT};
use autoscale_lib::pipeline::{PollingConfig, DEFAULT_SCHEDULE_AT_SECS};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, warn};

/// Environment variable holding the inter-cycle sleep in seconds
pub const SCHEDULE_AT_VAR: &str = "SCHEDULE_AT";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the scaling decision service
    #[serde(default = "default_dispatch_endpoint")]
    pub dispatch_endpoint: String,

    /// Docker CLI used for stats snapshots
    #[serde(default = "default_docker_path")]
    pub docker_path: String,

    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,

    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,

    /// Sleep between cycles in seconds, read from `SCHEDULE_AT`
    #[serde(skip, default = "default_schedule_at")]
    pub schedule_at_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_dispatch_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_docker_path() -> String {
    DEFAULT_DOCKER_PATH.to_string()
}

fn default_dispatch_queue_capacity() -> usize {
    DispatchQueueConfig::default().capacity
}

fn default_dispatch_concurrency() -> usize {
    DispatchQueueConfig::default().concurrency
}

fn default_schedule_at() -> u64 {
    DEFAULT_SCHEDULE_AT_SECS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            dispatch_endpoint: default_dispatch_endpoint(),
            docker_path: default_docker_path(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            dispatch_concurrency: default_dispatch_concurrency(),
            schedule_at_secs: default_schedule_at(),
        }
    }
}

/// Parse the `SCHEDULE_AT` value, falling back to the default when unusable
pub fn parse_schedule_at(raw: Option<&str>) -> u64 {
    match raw {
        None => DEFAULT_SCHEDULE_AT_SECS,
        Some(value) => match value.parse::<u64>() {
            Ok(secs) => secs,
            Err(e) => {
                error!(
                    value = %value,
                    error = %e,
                    default_secs = DEFAULT_SCHEDULE_AT_SECS,
                    "Invalid SCHEDULE_AT, using default"
                );
                DEFAULT_SCHEDULE_AT_SECS
            }
        },
    }
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        let schedule_at = std::env::var(SCHEDULE_AT_VAR).ok();
        Self::load_from(None, schedule_at.as_deref())
    }

    /// Load configuration from an explicit `AUTOSCALE_*` variable map
    ///
    /// With `None` the process environment is read instead.
    pub fn load_from(
        vars: Option<HashMap<String, String>>,
        schedule_at: Option<&str>,
    ) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("AUTOSCALE")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let mut agent_config = config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable configuration, using defaults");
            AgentConfig::default()
        });
        agent_config.schedule_at_secs = parse_schedule_at(schedule_at);

        Ok(agent_config)
    }

    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            schedule_at: Duration::from_secs(self.schedule_at_secs),
        }
    }

    pub fn dispatch_queue(&self) -> DispatchQueueConfig {
        DispatchQueueConfig {
            capacity: self.dispatch_queue_capacity,
            concurrency: self.dispatch_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_schedule_at_default() {
        assert_eq!(parse_schedule_at(None), 15);
    }

    #[test]
    fn test_schedule_at_valid() {
        assert_eq!(parse_schedule_at(Some("30")), 30);
        assert_eq!(parse_schedule_at(Some("0")), 0);
    }

    #[test]
    fn test_schedule_at_invalid_falls_back() {
        assert_eq!(parse_schedule_at(Some("fast")), 15);
        assert_eq!(parse_schedule_at(Some("-5")), 15);
        assert_eq!(parse_schedule_at(Some("")), 15);
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = AgentConfig::load_from(vars(&[]), None).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.dispatch_endpoint, "http://0.0.0.0:2441");
        assert_eq!(config.docker_path, "/usr/bin/docker");
        assert_eq!(config.dispatch_queue_capacity, 1024);
        assert_eq!(config.dispatch_concurrency, 16);
        assert_eq!(config.polling().schedule_at, Duration::from_secs(15));
    }

    #[test]
    fn test_prefixed_variables() {
        let config = AgentConfig::load_from(
            vars(&[
                ("AUTOSCALE_DISPATCH_ENDPOINT", "http://decider:2441"),
                ("AUTOSCALE_API_PORT", "9100"),
                ("AUTOSCALE_DISPATCH_CONCURRENCY", "4"),
                ("AUTOSCALE_NODE_NAME", "manager-1"),
            ]),
            Some("5"),
        )
        .unwrap();

        assert_eq!(config.dispatch_endpoint, "http://decider:2441");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.node_name, "manager-1");
        assert_eq!(config.dispatch_queue().concurrency, 4);
        assert_eq!(config.dispatch_queue().capacity, 1024);
        assert_eq!(config.schedule_at_secs, 5);
    }

    #[test]
    fn test_unreadable_config_uses_defaults() {
        let config = AgentConfig::load_from(
            vars(&[("AUTOSCALE_API_PORT", "not-a-port")]),
            Some("20"),
        )
        .unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.schedule_at_secs, 20);
    }
}
