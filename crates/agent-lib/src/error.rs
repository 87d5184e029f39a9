//! Error types for the sensing pipeline
//!
//! Each type maps to one failure class: discovery and collection errors abort
//! a cycle, policy and signal errors skip one service, dispatch errors are
//! only ever logged.

use crate::health::Component;
use thiserror::Error;

/// Failure to list services from the orchestrator
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to connect to docker engine: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("failed to list services: {0}")]
    List(#[source] bollard::errors::Error),
}

/// Failure to obtain a stats snapshot
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("failed to run stats command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stats command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("stats output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("malformed stats record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A policy label holds a value that does not parse as its numeric type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value {value:?} for label {field}")]
pub struct PolicyParseError {
    pub field: &'static str,
    pub value: String,
}

/// Reasons a single service produces no signal this cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("service has no running tasks")]
    NoRunningTasks,

    #[error("no stats reported for {0}")]
    StatsMissing(String),

    #[error("unparseable {metric} percentage {raw:?}")]
    Metric { metric: &'static str, raw: String },

    #[error(transparent)]
    Policy(#[from] PolicyParseError),

    #[error("service is not in replicated mode or has no replica count")]
    ReplicasUnset,
}

impl SignalError {
    /// Short label for metrics and cycle reports
    pub fn reason(&self) -> &'static str {
        match self {
            SignalError::NoRunningTasks => "no_running_tasks",
            SignalError::StatsMissing(_) => "stats_missing",
            SignalError::Metric { .. } => "metric",
            SignalError::Policy(_) => "policy",
            SignalError::ReplicasUnset => "replicas_unset",
        }
    }
}

/// Failure to deliver a signal downstream
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode signal: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unable to send stats ({status}): {body}")]
    Rejected { status: String, body: String },
}

/// Failure that aborts a whole polling cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("service discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("stats collection failed: {0}")]
    Collection(#[from] CollectionError),
}

impl CycleError {
    /// Pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Discovery(_) => "discovery",
            CycleError::Collection(_) => "collection",
        }
    }

    /// Health component that owns the failing stage
    pub fn component(&self) -> Component {
        match self {
            CycleError::Discovery(_) => Component::Enumerator,
            CycleError::Collection(_) => Component::Collector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_error_names_field() {
        let err = PolicyParseError {
            field: "swarm.autoscale.cpu",
            value: "high".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("swarm.autoscale.cpu"));
        assert!(message.contains("high"));
    }

    #[test]
    fn test_signal_error_reasons() {
        assert_eq!(SignalError::NoRunningTasks.reason(), "no_running_tasks");
        assert_eq!(SignalError::ReplicasUnset.reason(), "replicas_unset");
        let policy = SignalError::from(PolicyParseError {
            field: "swarm.autoscale.min",
            value: "two".to_string(),
        });
        assert_eq!(policy.reason(), "policy");
        assert!(policy.to_string().contains("swarm.autoscale.min"));
    }

    #[test]
    fn test_rejected_dispatch_message() {
        let err = DispatchError::Rejected {
            status: "503 Service Unavailable".to_string(),
            body: "overloaded".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("overloaded"));
    }
}
