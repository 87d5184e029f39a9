//! Polling loop
//!
//! Runs cycles back to back with a fixed sleep in between. A cycle always
//! finishes before the next one starts or the loop stops.

use super::Pipeline;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::info;

/// Default sleep between cycles, in seconds
pub const DEFAULT_SCHEDULE_AT_SECS: u64 = 15;

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub schedule_at: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            schedule_at: Duration::from_secs(DEFAULT_SCHEDULE_AT_SECS),
        }
    }
}

/// Loop that drives the pipeline until shutdown
pub struct PollingLoop {
    pipeline: Pipeline,
    config: PollingConfig,
}

impl PollingLoop {
    pub fn new(pipeline: Pipeline, config: PollingConfig) -> Self {
        Self { pipeline, config }
    }

    /// Run cycles until a shutdown message arrives
    ///
    /// Returns the number of cycles run.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!(
            schedule_at_secs = self.config.schedule_at.as_secs(),
            "Starting polling loop"
        );

        let logger = self.pipeline.logger().clone();
        let mut cycles = 0u64;

        loop {
            let start = Instant::now();
            match self.pipeline.run_cycle().await {
                Ok(report) => logger.log_cycle_completed(
                    report.services,
                    report.signals,
                    report.skipped_total(),
                    start.elapsed(),
                ),
                Err(e) => logger.log_cycle_failed(e.stage(), &e),
            }
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.config.schedule_at) => {}
                _ = shutdown.recv() => {
                    info!(cycles = cycles, "Shutting down polling loop");
                    break;
                }
            }
        }

        cycles
    }
}
