//! Container stats collection
//!
//! A collection takes one point-in-time snapshot of every running container
//! on the node and keys it by the service-derived short name, so that the
//! pipeline can look stats up by Swarm service name.

mod docker_stats;


pub use docker_stats::{
    parse_percent, parse_stats_output, short_name, DockerStatsCollector, DEFAULT_DOCKER_PATH,
};

use crate::error::CollectionError;
use crate::models::ContainerStat;
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of container stats snapshots
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Take a single snapshot of all running containers
    async fn collect(&self) -> Result<StatsSnapshot, CollectionError>;
}

/// Container stats keyed by short name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    stats: HashMap<String, ContainerStat>,
    collisions: usize,
}

impl StatsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a stat under its short name, replacing any earlier entry
    pub fn insert(&mut self, stat: ContainerStat) {
        if let Some(previous) = self.stats.insert(stat.short_name.clone(), stat) {
            self.collisions += 1;
            tracing::debug!(
                short_name = %previous.short_name,
                replaced = %previous.name,
                "Container short name collision, keeping later record"
            );
        }
    }

    /// Get stats for a service name
    pub fn get(&self, short_name: &str) -> Option<&ContainerStat> {
        self.stats.get(short_name)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Number of records that replaced an earlier one with the same short name
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

impl FromIterator<ContainerStat> for StatsSnapshot {
    fn from_iter<I: IntoIterator<Item = ContainerStat>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for stat in iter {
            snapshot.insert(stat);
        }
        snapshot
    }
}
