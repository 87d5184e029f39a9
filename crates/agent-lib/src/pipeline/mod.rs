//! Polling cycle: enumerate, collect, correlate, dispatch
//!
//! One cycle lists the autoscale services, takes a single stats snapshot
//! shared by every service, builds a scaling signal per service and queues
//! it for dispatch. A failing service is skipped; only discovery and
//! collection failures abort the cycle.

mod r#loop;


pub use r#loop::{PollingConfig, PollingLoop, DEFAULT_SCHEDULE_AT_SECS};

use crate::collector::{StatsSnapshot, StatsSource};
use crate::discovery::ServiceEnumerator;
use crate::dispatch::DispatchHandle;
use crate::error::{CycleError, SignalError};
use crate::health::HealthRegistry;
use crate::models::{BasedStats, CurrentStats, ScalingSignal, ServiceDescriptor};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::policy;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Outcome of one polling cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// Autoscale services returned by discovery
    pub services: usize,
    /// Signals built and handed to the dispatch queue
    pub signals: usize,
    /// Signals the dispatch queue refused
    pub dropped: usize,
    /// Skipped services by reason
    pub skipped: BTreeMap<&'static str, usize>,
}

impl CycleReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: &str) -> usize {
        self.skipped.get(reason).copied().unwrap_or(0)
    }
}

/// Build the scaling signal for one service from a stats snapshot
pub fn build_signal(
    service: &ServiceDescriptor,
    snapshot: &StatsSnapshot,
) -> Result<ScalingSignal, SignalError> {
    if service.running_tasks == 0 {
        return Err(SignalError::NoRunningTasks);
    }

    let stat = snapshot
        .get(&service.name)
        .ok_or_else(|| SignalError::StatsMissing(service.name.clone()))?;

    let cpu_percentage = stat.cpu_percent.ok_or_else(|| SignalError::Metric {
        metric: "cpu",
        raw: stat.cpu_raw.clone(),
    })?;
    let memory_percentage = stat.memory.percent.ok_or_else(|| SignalError::Metric {
        metric: "memory",
        raw: stat.memory.percent_raw.clone(),
    })?;

    let policy = policy::extract(&service.labels)?;
    let replicas = service.replicas.ok_or(SignalError::ReplicasUnset)?;

    Ok(ScalingSignal {
        service_id: service.id.clone(),
        service_name: service.name.clone(),
        current: CurrentStats {
            cpu_percentage,
            memory_percentage,
            replicas,
        },
        based: BasedStats::from(policy),
    })
}

/// The sensing pipeline for one cluster
pub struct Pipeline {
    enumerator: Arc<dyn ServiceEnumerator>,
    stats_source: Arc<dyn StatsSource>,
    dispatch: DispatchHandle,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    /// Run one polling cycle
    ///
    /// Queued signals may still be in flight when this returns.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        match self.execute_cycle().await {
            Ok(report) => {
                self.health
                    .record_cycle_completed(
                        report.services,
                        report.signals,
                        report.skipped_total(),
                    )
                    .await;
                Ok(report)
            }
            Err(e) => {
                self.health.record_cycle_failed(&e).await;
                self.metrics.inc_cycle_errors(e.stage());
                Err(e)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<CycleReport, CycleError> {
        let start = Instant::now();

        let services = self.enumerator.list_autoscale_services().await?;

        self.metrics.set_services_observed(services.len());
        let mut report = CycleReport {
            services: services.len(),
            ..Default::default()
        };

        let (active, idle): (Vec<_>, Vec<_>) =
            services.into_iter().partition(|s| s.running_tasks > 0);

        for service in &idle {
            self.record_skip(&mut report, service, SignalError::NoRunningTasks);
        }

        if !active.is_empty() {
            let collect_start = Instant::now();
            let snapshot = self.stats_source.collect().await?;
            self.metrics.observe_collection_latency(collect_start.elapsed());

            for service in &active {
                match build_signal(service, &snapshot) {
                    Ok(signal) => {
                        self.logger.log_signal(&signal);
                        report.signals += 1;
                        if !self.dispatch.submit(signal) {
                            report.dropped += 1;
                        }
                    }
                    Err(e) => self.record_skip(&mut report, service, e),
                }
            }
        }

        self.metrics.observe_cycle_latency(start.elapsed());
        Ok(report)
    }

    fn record_skip(&self, report: &mut CycleReport, service: &ServiceDescriptor, e: SignalError) {
        let reason = e.reason();
        *report.skipped.entry(reason).or_default() += 1;
        self.metrics.inc_services_skipped(reason);

        match e {
            SignalError::NoRunningTasks => {
                warn!(service = %service.name, "Service has no running tasks");
            }
            SignalError::StatsMissing(_) => {
                debug!(service = %service.name, "No stats reported for service yet");
            }
            e => {
                error!(
                    service = %service.name,
                    service_id = %service.id,
                    reason = reason,
                    error = %e,
                    "Skipping service this cycle"
                );
            }
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}

/// Builder for the pipeline
pub struct PipelineBuilder {
    enumerator: Option<Arc<dyn ServiceEnumerator>>,
    stats_source: Option<Arc<dyn StatsSource>>,
    dispatch: Option<DispatchHandle>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            enumerator: None,
            stats_source: None,
            dispatch: None,
            health: None,
            logger: None,
        }
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn ServiceEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn stats_source(mut self, stats_source: Arc<dyn StatsSource>) -> Self {
        self.stats_source = Some(stats_source);
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchHandle) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let enumerator = self
            .enumerator
            .ok_or_else(|| anyhow::anyhow!("Service enumerator is required"))?;
        let stats_source = self
            .stats_source
            .ok_or_else(|| anyhow::anyhow!("Stats source is required"))?;
        let dispatch = self
            .dispatch
            .ok_or_else(|| anyhow::anyhow!("Dispatch handle is required"))?;

        Ok(Pipeline {
            enumerator,
            stats_source,
            dispatch,
            health: self.health.unwrap_or_default(),
            metrics: AgentMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
