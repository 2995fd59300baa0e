//! The one contract this manager consumes from the container runtime:
//! pushing a resolved cpuset down after the Policy has decided it (§1, §6).

pub mod proto;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tracing::warn;

use crate::error::ManagerError;
use proto::runtime_service_client::RuntimeServiceClient;
use proto::UpdateContainerResourcesRequest;

/// The runtime collaborator's one contract the Manager depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn update_container_resources(&self, container_id: &str, cpuset_cpus: &str) -> Result<(), ManagerError>;
}

/// Production implementation: a thin `tonic` client over `runtime.v1`.
#[derive(Debug, Clone)]
pub struct GrpcContainerRuntime {
    client: RuntimeServiceClient<Channel>,
}

impl GrpcContainerRuntime {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: RuntimeServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl ContainerRuntime for GrpcContainerRuntime {
    async fn update_container_resources(&self, container_id: &str, cpuset_cpus: &str) -> Result<(), ManagerError> {
        let request = UpdateContainerResourcesRequest {
            container_id: container_id.to_string(),
            cpuset_cpus: cpuset_cpus.to_string(),
        };

        self.client
            .clone()
            .update_container_resources(request)
            .await
            .map_err(|status| {
                warn!(container_id, %status, "runtime rejected UpdateContainerResources");
                ManagerError::RuntimeUpdateFailed {
                    container_id: container_id.to_string(),
                    reason: status.message().to_string(),
                }
            })?;

        Ok(())
    }
}

/// One recorded `update_container_resources` call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub container_id: String,
    pub cpuset_cpus: String,
}

/// Test/sim-only runtime: records every call and can be told to fail
/// specific container ids, to exercise the Manager's rollback path (§4.3).
#[derive(Debug, Clone, Default)]
pub struct FakeContainerRuntime {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failing: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, container_id: impl Into<String>) {
        self.failing.lock().unwrap().insert(container_id.into());
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn update_container_resources(&self, container_id: &str, cpuset_cpus: &str) -> Result<(), ManagerError> {
        if self.failing.lock().unwrap().contains(container_id) {
            return Err(ManagerError::RuntimeUpdateFailed {
                container_id: container_id.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        self.calls.lock().await.push(RecordedCall {
            container_id: container_id.to_string(),
            cpuset_cpus: cpuset_cpus.to_string(),
        });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
