//! Autoscale agent - Docker Swarm autoscaling sensor
//!
//! Runs on a Swarm manager node, samples container stats for every
//! autoscale-enabled service and forwards scaling signals to the decision
//! service.

use anyhow::{Context, Result};
use autoscale_agent::{api, config::AgentConfig};
use autoscale_lib::{
    collector::DockerStatsCollector,
    discovery::SwarmServiceEnumerator,
    dispatch::{DispatchQueue, HttpDispatcher},
    health::HealthRegistry,
    observability::{AgentMetrics, StructuredLogger},
    pipeline::{PipelineBuilder, PollingLoop},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting autoscale-agent");

    let config = AgentConfig::load()?;
    info!(node_name = %config.node_name, "Agent configured");

    let enumerator =
        SwarmServiceEnumerator::connect().context("Failed to create Docker Engine client")?;
    let collector = DockerStatsCollector::new(&config.docker_path);
    let dispatcher = HttpDispatcher::new(&config.dispatch_endpoint)?;
    let dispatch_url = dispatcher.url().to_string();

    let health_registry = HealthRegistry::new();
    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let queue = DispatchQueue::start(
        Arc::new(dispatcher),
        config.dispatch_queue(),
        health_registry.clone(),
        metrics,
    );

    let pipeline = PipelineBuilder::new()
        .enumerator(Arc::new(enumerator))
        .stats_source(Arc::new(collector))
        .dispatch(queue.handle())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    logger.log_startup(AGENT_VERSION, &dispatch_url, config.schedule_at_secs);

    let api_handle = tokio::spawn(api::serve(config.api_port, health_registry.clone()));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let polling = tokio::spawn(PollingLoop::new(pipeline, config.polling()).run(shutdown_rx));

    health_registry.set_accepting(true).await;

    let mut outcome = Ok(());
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    outcome = Err(e);
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    health_registry.set_accepting(false).await;
    let _ = shutdown_tx.send(());

    let cycles = polling.await.context("Polling loop task failed")?;
    queue.shutdown().await;
    info!(cycles = cycles, "Shutdown complete");

    outcome
}
