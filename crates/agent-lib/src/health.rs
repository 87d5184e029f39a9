//! Pipeline health for the liveness and readiness endpoints
//!
//! The registry always tracks the three pipeline components. Alongside
//! their status it keeps the outcome of the most recent polling cycle; the
//! agent only reports ready once a cycle has completed.

use crate::error::CycleError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pipeline stage whose health is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Enumerator,
    Collector,
    Dispatcher,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Enumerator,
        Component::Collector,
        Component::Dispatcher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Enumerator => "enumerator",
            Component::Collector => "collector",
            Component::Dispatcher => "dispatcher",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Dispatch failures; cycles still run
    Degraded,
    /// The stage failed on its last attempt
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last status change
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// How the most recent polling cycle ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed {
        services: usize,
        signals: usize,
        skipped: usize,
    },
    Failed {
        stage: &'static str,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    pub finished_at: i64,
    pub outcome: CycleOutcome,
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Worst component status
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleRecord>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    accepting: bool,
    cycles_completed: u64,
    cycles_failed: u64,
    last_cycle: Option<CycleRecord>,
}

/// Health shared by the pipeline, the dispatch worker and the API
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the agent starts not accepting work
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::new(ComponentStatus::Healthy, None)))
            .collect();

        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                accepting: false,
                cycles_completed: 0,
                cycles_failed: 0,
                last_cycle: None,
            })),
        }
    }

    async fn set(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(component, ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark whether the process is running its polling loop
    pub async fn set_accepting(&self, accepting: bool) {
        self.state.write().await.accepting = accepting;
    }

    /// Record a cycle that got through correlation
    ///
    /// Enumeration and collection both count as healthy afterwards, even
    /// when no snapshot was needed.
    pub async fn record_cycle_completed(&self, services: usize, signals: usize, skipped: usize) {
        let mut state = self.state.write().await;
        for component in [Component::Enumerator, Component::Collector] {
            state.components.insert(
                component,
                ComponentHealth::new(ComponentStatus::Healthy, None),
            );
        }
        state.cycles_completed += 1;
        state.last_cycle = Some(CycleRecord {
            finished_at: chrono::Utc::now().timestamp(),
            outcome: CycleOutcome::Completed {
                services,
                signals,
                skipped,
            },
        });
    }

    /// Record a cycle aborted by `error`, marking the failing stage unhealthy
    pub async fn record_cycle_failed(&self, error: &CycleError) {
        let message = error.to_string();
        let mut state = self.state.write().await;
        state.components.insert(
            error.component(),
            ComponentHealth::new(ComponentStatus::Unhealthy, Some(message.clone())),
        );
        state.cycles_failed += 1;
        state.last_cycle = Some(CycleRecord {
            finished_at: chrono::Utc::now().timestamp(),
            outcome: CycleOutcome::Failed {
                stage: error.stage(),
                error: message,
            },
        });
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state.components.clone(),
            cycles_completed: state.cycles_completed,
            cycles_failed: state.cycles_failed,
            last_cycle: state.last_cycle.clone(),
        }
    }

    /// Ready once accepting work, after one completed cycle, with no stage down
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        if !state.accepting {
            return ReadinessResponse::not_ready("Agent is not accepting work");
        }
        if state.cycles_completed == 0 {
            return ReadinessResponse::not_ready("No polling cycle has completed yet");
        }
        if let Some((component, health)) = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy)
        {
            return ReadinessResponse::not_ready(format!(
                "{} unhealthy: {}",
                component,
                health.message.as_deref().unwrap_or("no detail")
            ));
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}
