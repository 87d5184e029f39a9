//! Swarm service discovery
//!
//! Lists the services carrying the autoscale marker label, with live task
//! counts included in the same Engine API call.

use crate::error::DiscoveryError;
use crate::models::ServiceDescriptor;
use crate::policy::LABEL_AUTOSCALE;
use async_trait::async_trait;
use bollard::models::Service;
use bollard::service::ListServicesOptions;
use bollard::Docker;
use std::collections::HashMap;
use tracing::{debug, info};

/// Source of autoscale-enabled services
#[async_trait]
pub trait ServiceEnumerator: Send + Sync {
    /// List every service opted into autoscaling
    async fn list_autoscale_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError>;
}

/// Enumerator backed by the Docker Engine API of a Swarm manager
#[derive(Debug, Clone)]
pub struct SwarmServiceEnumerator {
    docker: Docker,
}

impl SwarmServiceEnumerator {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket)
    pub fn connect() -> Result<Self, DiscoveryError> {
        let docker = Docker::connect_with_local_defaults().map_err(DiscoveryError::Connect)?;
        info!("Docker engine client initialized");
        Ok(Self { docker })
    }

    /// Wrap an existing client
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ServiceEnumerator for SwarmServiceEnumerator {
    async fn list_autoscale_services(&self) -> Result<Vec<ServiceDescriptor>, DiscoveryError> {
        let mut filters = HashMap::new();
        filters.insert("label", vec![LABEL_AUTOSCALE]);

        let options = ListServicesOptions {
            filters,
            status: true,
        };

        let services = self
            .docker
            .list_services(Some(options))
            .await
            .map_err(DiscoveryError::List)?;

        debug!(count = services.len(), "Listed autoscale services");

        Ok(services.into_iter().map(descriptor_from_service).collect())
    }
}

/// Convert an Engine API service into a descriptor
///
/// Missing identity fields become empty strings and a missing status counts
/// as zero running tasks. `replicas` is only set for replicated services that
/// declare a non-negative count.
pub fn descriptor_from_service(service: Service) -> ServiceDescriptor {
    let running_tasks = service
        .service_status
        .and_then(|status| status.running_tasks)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);

    let spec = service.spec.unwrap_or_default();
    let replicas = spec
        .mode
        .and_then(|mode| mode.replicated)
        .and_then(|replicated| replicated.replicas)
        .and_then(|n| u64::try_from(n).ok());

    ServiceDescriptor {
        id: service.id.unwrap_or_default(),
        name: spec.name.unwrap_or_default(),
        running_tasks,
        replicas,
        labels: spec.labels.unwrap_or_default(),
    }
}
