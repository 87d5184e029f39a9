//! Core data models for the autoscale agent

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Swarm service opted into autoscaling, as seen during one polling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub running_tasks: u64,
    /// Declared replica count; `None` for non-replicated services
    pub replicas: Option<u64>,
    pub labels: HashMap<String, String>,
}

/// Memory usage reported for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Raw usage string, e.g. `"12.5MiB / 1.944GiB"`
    pub raw: String,
    /// Usage percentage; `None` when the runtime did not report a number
    pub percent: Option<f64>,
    pub percent_raw: String,
}

/// Network and block I/O strings reported for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoUsage {
    pub network: String,
    pub block: String,
}

/// Point-in-time resource usage of a running container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStat {
    pub container_id: String,
    pub name: String,
    /// Name up to the first `.`; Swarm tasks are named `service.slot.id`
    pub short_name: String,
    pub cpu_percent: Option<f64>,
    pub cpu_raw: String,
    pub memory: MemoryUsage,
    pub io: IoUsage,
    pub pids: u64,
}

/// Autoscale policy declared in service labels
///
/// Every field is independent; an unset threshold is never "target 0".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub min_replicas: Option<i64>,
    pub max_replicas: Option<i64>,
}

/// Observed state of a service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentStats {
    pub cpu_percentage: f64,
    pub memory_percentage: f64,
    pub replicas: u64,
}

/// Thresholds and bounds the downstream decision maker scales against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasedStats {
    pub cpu_percentage: f64,
    pub memory_percentage: f64,
    pub min: i64,
    pub max: i64,
}

impl From<Policy> for BasedStats {
    /// Unset policy fields go on the wire as zero
    fn from(policy: Policy) -> Self {
        Self {
            cpu_percentage: policy.cpu_percent.unwrap_or_default(),
            memory_percentage: policy.memory_percent.unwrap_or_default(),
            min: policy.min_replicas.unwrap_or_default(),
            max: policy.max_replicas.unwrap_or_default(),
        }
    }
}

/// Scaling signal sent to the decision endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingSignal {
    pub service_id: String,
    pub service_name: String,
    pub current: CurrentStats,
    pub based: BasedStats,
}
