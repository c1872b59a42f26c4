//! Cluster client trait and pod status types.
//!
//! The adapter never talks to a cluster API directly; everything goes
//! through the [`ClusterClient`] trait. A production implementation wraps
//! whatever Kubernetes client library the deployment uses; tests substitute
//! an in-memory fake. The trait's surface is exactly what the adapter
//! lifecycle needs: submit, observe, wait, upload, fetch logs, delete.

use crate::error::Result;
use crate::manifest::{PodManifest, WorkloadManifest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Pod Phase
// =============================================================================

/// Coarse pod lifecycle phase reported by the cluster.
///
/// The adapter branches on `Succeeded` for entrypoint probes and otherwise
/// relies on the container-level predicates on [`PodSnapshot`]; the full
/// set is carried so snapshots round-trip the cluster's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    /// Scheduled but not up yet; the init-container handshake happens here.
    #[default]
    Pending,
    /// The main container set has started.
    Running,
    /// Every container finished with exit code zero.
    Succeeded,
    /// Some container finished non-zero.
    Failed,
    /// The cluster could not determine a phase.
    Unknown,
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(phase)
    }
}

// =============================================================================
// Container State
// =============================================================================

/// State of a single container, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum ContainerStateKind {
    /// Container is waiting to start.
    Waiting {
        /// Cluster-reported reason (image pull, init ordering, ...).
        reason: String,
    },
    /// Container is running.
    Running,
    /// Container has terminated.
    Terminated {
        /// The container's exit code.
        exit_code: i32,
    },
}

/// Status entry for one container in a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Container name within the pod.
    pub name: String,
    /// Whether the container passes its readiness check.
    pub ready: bool,
    /// Current state.
    pub state: ContainerStateKind,
}

impl ContainerState {
    /// Returns the exit code if the container has terminated.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            ContainerStateKind::Terminated { exit_code } => Some(exit_code),
            _ => None,
        }
    }
}

// =============================================================================
// Pod Snapshot
// =============================================================================

/// A point-in-time observation of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    /// Pod name.
    pub name: String,
    /// Namespace the pod lives in.
    pub namespace: String,
    /// High-level phase.
    pub phase: PodPhase,
    /// The pod's address inside the cluster network, once assigned.
    pub pod_ip: Option<String>,
    /// Init container statuses, in declaration order.
    pub init_containers: Vec<ContainerState>,
    /// Main container statuses.
    pub containers: Vec<ContainerState>,
}

impl PodSnapshot {
    /// The standard readiness predicate: every main container is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.containers.is_empty() && self.containers.iter().all(|c| c.ready)
    }

    /// A pod is terminal once any main container has terminated.
    ///
    /// Sidecars follow the primary down via the termination-file handshake,
    /// so one terminated container means the pod is on its way out and its
    /// exit code is recoverable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.containers.iter().any(|c| c.exit_code().is_some())
    }

    /// Whether the pod reports at least one init container status.
    #[must_use]
    pub fn has_init_status(&self) -> bool {
        !self.init_containers.is_empty()
    }

    /// Whether the first init container is in the running state.
    #[must_use]
    pub fn init_running(&self) -> bool {
        matches!(
            self.init_containers.first().map(|c| &c.state),
            Some(ContainerStateKind::Running)
        )
    }

    /// Sum of the exit codes of every terminated container.
    ///
    /// Zero only when every reporting container exited zero; any sidecar
    /// failure taints the sum.
    #[must_use]
    pub fn terminated_exit_sum(&self) -> i32 {
        self.containers.iter().filter_map(ContainerState::exit_code).sum()
    }
}

// =============================================================================
// Cluster Client
// =============================================================================

/// Predicate over pod snapshots, used by [`ClusterClient::await_pod`].
pub type PodPredicate = dyn Fn(&PodSnapshot) -> bool + Send + Sync;

/// Operations the adapter needs from the cluster.
///
/// # Contract
///
/// - `create_pod` / `create_workload` are create-or-replace: resubmitting
///   the same name replaces the previous resource.
/// - `await_pod` resolves with the first snapshot satisfying the predicate,
///   with `None` if the pod is deleted while waiting, and with
///   [`crate::Error::PodWaitTimeout`] when the bound elapses.
/// - `delete_workload` uses foreground propagation: it returns once the
///   workload's dependents are gone.
/// - `upload_file` streams a local file into the named container of a
///   running pod.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Creates or replaces a bare pod.
    async fn create_pod(&self, namespace: &str, manifest: &PodManifest) -> Result<()>;

    /// Creates or replaces a batch workload.
    async fn create_workload(&self, namespace: &str, manifest: &WorkloadManifest) -> Result<()>;

    /// Lists pods carrying the given label.
    async fn list_pods_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<PodSnapshot>>;

    /// Fetches a pod by name. `None` when the pod does not exist.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodSnapshot>>;

    /// Blocks until `predicate` holds for the pod, it is deleted (`None`),
    /// or `timeout` elapses (error).
    async fn await_pod(
        &self,
        namespace: &str,
        name: &str,
        predicate: &PodPredicate,
        timeout: Duration,
    ) -> Result<Option<PodSnapshot>>;

    /// Fetches the pod's aggregated log output.
    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String>;

    /// Uploads a local file into a container of a running pod.
    async fn upload_file(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        local: &Path,
        remote: &str,
    ) -> Result<()>;

    /// Deletes a pod. Missing pods are not an error.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Deletes a workload with foreground propagation.
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<()>;
}
