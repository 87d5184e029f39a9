//! `docker stats` snapshot collection
//!
//! Runs the Docker CLI once in no-stream mode with a format template that
//! renders each container as a single-line JSON object:
//! - container id and name
//! - memory usage (raw and percent)
//! - CPU percent
//! - network and block I/O
//! - process count

use super::{StatsSnapshot, StatsSource};
use crate::error::CollectionError;
use crate::models::{ContainerStat, IoUsage, MemoryUsage};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Default location of the Docker CLI
pub const DEFAULT_DOCKER_PATH: &str = "/usr/bin/docker";

const STATS_FORMAT: &str = r#"{"container":"{{.Container}}","name":"{{.Name}}","memory":{"raw":"{{.MemUsage}}","percent":"{{.MemPerc}}"},"cpu":"{{.CPUPerc}}","io":{"network":"{{.NetIO}}","block":"{{.BlockIO}}"},"pids":{{.PIDs}}}"#;

/// One line of `docker stats` output
#[derive(Debug, Deserialize)]
struct StatsRecord {
    container: String,
    name: String,
    memory: MemoryRecord,
    cpu: String,
    io: IoRecord,
    pids: u64,
}

#[derive(Debug, Deserialize)]
struct MemoryRecord {
    raw: String,
    percent: String,
}

#[derive(Debug, Deserialize)]
struct IoRecord {
    network: String,
    block: String,
}

impl From<StatsRecord> for ContainerStat {
    fn from(record: StatsRecord) -> Self {
        Self {
            short_name: short_name(&record.name).to_string(),
            container_id: record.container,
            name: record.name,
            cpu_percent: parse_percent(&record.cpu),
            cpu_raw: record.cpu,
            memory: MemoryUsage {
                raw: record.memory.raw,
                percent: parse_percent(&record.memory.percent),
                percent_raw: record.memory.percent,
            },
            io: IoUsage {
                network: record.io.network,
                block: record.io.block,
            },
            pids: record.pids,
        }
    }
}

/// Collector that shells out to the Docker CLI
#[derive(Debug, Clone)]
pub struct DockerStatsCollector {
    docker_path: PathBuf,
}

impl DockerStatsCollector {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    pub fn docker_path(&self) -> &Path {
        &self.docker_path
    }
}

impl Default for DockerStatsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_PATH)
    }
}

#[async_trait]
impl StatsSource for DockerStatsCollector {
    async fn collect(&self) -> Result<StatsSnapshot, CollectionError> {
        let output = Command::new(&self.docker_path)
            .args(["stats", "--no-stream", "--format", STATS_FORMAT])
            .output()
            .await
            .map_err(|source| CollectionError::Spawn {
                command: self.docker_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CollectionError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)?;
        let snapshot = parse_stats_output(&stdout)?;

        debug!(
            containers = snapshot.len(),
            collisions = snapshot.collisions(),
            "Collected container stats"
        );

        Ok(snapshot)
    }
}

/// Parse line-delimited stats records into a snapshot
///
/// Blank lines are skipped. A single malformed record fails the whole parse.
pub fn parse_stats_output(output: &str) -> Result<StatsSnapshot, CollectionError> {
    let mut snapshot = StatsSnapshot::new();

    for (index, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: StatsRecord = serde_json::from_str(line)
            .map_err(|source| CollectionError::Record {
                line: index + 1,
                source,
            })?;
        snapshot.insert(record.into());
    }

    Ok(snapshot)
}

/// Service name part of a task container name (`service.slot.id`)
pub fn short_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Parse a percentage such as `"12.3%"`
///
/// Non-finite values count as unparseable.
pub fn parse_percent(raw: &str) -> Option<f64> {
    raw.strip_suffix('%')
        .unwrap_or(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
