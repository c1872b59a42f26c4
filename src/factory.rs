//! Per-child orchestration.
//!
//! The factory is the only intended constructor of [`RemoteProcess`]: it
//! checks two relay ports out of the shared pool, wires up the release
//! callback, and hands everything to the adapter. The pool is the single
//! contention point across concurrent children: `create` blocks while no
//! ports are available.

use crate::client::ClusterClient;
use crate::constants::{DEFAULT_STDIN_PORT, DEFAULT_WORKLOAD_TTL_SECS};
use crate::error::Result;
use crate::ports::PortPool;
use crate::process::{ChildSpec, PortReleaser, RemoteProcess};
use std::sync::Arc;
use tracing::debug;

/// Deployment-wide settings shared by every child the factory mints.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Namespace all workloads are submitted into.
    pub namespace: String,
    /// Port of the caller's heartbeat HTTP server.
    pub heartbeat_port: u16,
    /// Host the heartbeat sidecar polls. `None` uses the same discovered
    /// address the relay sidecars dial back to; platforms that reach the
    /// caller through an alias (e.g. `host.docker.internal`) set it here.
    pub heartbeat_host: Option<String>,
    /// Caller address baked into the relay sidecar commands. `None`
    /// discovers the local address at construction time.
    pub caller_host: Option<String>,
    /// In-pod port the stdin relay listens on.
    pub stdin_port: u16,
    /// Seconds a finished workload lingers before garbage collection.
    pub workload_ttl_seconds: u32,
}

impl FactoryConfig {
    /// Creates a config with default ports and discovery-based addressing.
    pub fn new(namespace: impl Into<String>, heartbeat_port: u16) -> Self {
        Self {
            namespace: namespace.into(),
            heartbeat_port,
            heartbeat_host: None,
            caller_host: None,
            stdin_port: DEFAULT_STDIN_PORT,
            workload_ttl_seconds: DEFAULT_WORKLOAD_TTL_SECS,
        }
    }
}

/// Mints one [`RemoteProcess`] per child.
pub struct RemoteProcessFactory {
    client: Arc<dyn ClusterClient>,
    config: FactoryConfig,
    ports: Arc<PortPool>,
}

impl RemoteProcessFactory {
    /// Creates a factory over the given cluster client and port pool.
    pub fn new(client: Arc<dyn ClusterClient>, config: FactoryConfig, ports: Arc<PortPool>) -> Self {
        Self {
            client,
            config,
            ports,
        }
    }

    /// Launches one child.
    ///
    /// Blocks while the pool has fewer than two free ports. Ports are
    /// returned to the pool when the adapter closes, including when
    /// construction itself fails partway.
    pub async fn create(&self, child: ChildSpec) -> Result<RemoteProcess> {
        let stdout_port = self.ports.acquire().await;
        let stderr_port = self.ports.acquire().await;
        debug!(
            pod = %child.pod_name,
            stdout_port,
            stderr_port,
            "checked out relay ports"
        );

        let release: PortReleaser = {
            let pool = Arc::clone(&self.ports);
            Arc::new(move |port| pool.release(port))
        };

        RemoteProcess::start(
            Arc::clone(&self.client),
            &self.config,
            child,
            stdout_port,
            stderr_port,
            release,
        )
        .await
    }
}
