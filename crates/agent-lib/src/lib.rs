//! Sensing pipeline for Docker Swarm autoscaling
//!
//! This crate provides the core functionality for:
//! - Enumerating autoscale-enabled Swarm services
//! - Collecting container stats snapshots from the Docker CLI
//! - Parsing per-service scaling policy from labels
//! - Building and dispatching scaling signals to the decision service
//! - Health checks and observability

pub mod collector;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod policy;

pub use collector::{DockerStatsCollector, StatsSnapshot, StatsSource};
pub use discovery::{ServiceEnumerator, SwarmServiceEnumerator};
pub use dispatch::{
    DispatchHandle, DispatchQueue, DispatchQueueConfig, HttpDispatcher, SignalSink,
};
pub use error::{
    CollectionError, CycleError, DiscoveryError, DispatchError, PolicyParseError, SignalError,
};
pub use health::{
    Component, ComponentHealth, ComponentStatus, CycleOutcome, CycleRecord, HealthRegistry,
    HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use pipeline::{build_signal, CycleReport, Pipeline, PipelineBuilder, PollingConfig, PollingLoop};
