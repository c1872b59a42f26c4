//! # podproc
//!
//! **Remote-Process Adapter for Cluster Workloads**
//!
//! This crate makes a container running inside a remote cluster behave,
//! to an in-process caller, like a local child process: a writable stdin,
//! readable stdout/stderr byte streams, a blocking wait, an exit code,
//! and a forcible termination primitive.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌───────────── caller host ─────────────┐   ┌───────────── cluster ─────────────┐
//! │                                       │   │  Pod                              │
//! │  RemoteProcessFactory                 │   │  ┌──────┐ FIFOs  ┌─────────────┐  │
//! │    │ checks out 2 ports               │   │  │ init │──────▶ │    main     │  │
//! │    ▼                                  │   │  └──────┘        └──┬───┬───┬──┘  │
//! │  RemoteProcess                        │   │   ▲ /config          │   │   │    │
//! │    stdout listener ◀──────────────────┼───┼───┼──── relay-stdout ┘   │   │    │
//! │    stderr listener ◀──────────────────┼───┼───┼──── relay-stderr ────┘   │    │
//! │    stdin socket ──────────────────────┼───┼───┼──▶  remote-stdin ────────┘    │
//! │    heartbeat server ◀─────────────────┼───┼───┼──── call-heartbeat-server     │
//! │                                       │   │   └── file injector (uploads)     │
//! └───────────────────────────────────────┘   └───────────────────────────────────┘
//! ```
//!
//! The pod couples its containers through three emptyDir scratch volumes:
//! `/pipes` holds the stdio FIFOs, `/config` receives the caller's injected
//! files, and `/termination` carries the primary's death certificate that
//! the sidecar watchdogs poll. Relay sidecars bridge the FIFOs to TCP
//! sockets in the caller's network namespace with `socat`.
//!
//! # Lifecycle
//!
//! ```text
//!   bind listeners ─▶ resolve entrypoint ─▶ submit workload ─▶ find pod
//!        │                                                        │
//!        ▼                                                        ▼
//!   acceptors armed                                    init container running
//!                                                                 │
//!   attach stdin ◀─ pod ready or terminal ◀─ upload files + sentinel
//!        │
//!        ▼
//!   wait() ─▶ pod terminal ─▶ exit code = Σ terminated containers
//! ```
//!
//! Construction is all-or-nothing: any failure closes both listeners,
//! returns both ports to the pool, and deletes a submitted workload
//! best-effort. Teardown (`close`) is idempotent and swallows every error
//! so it can never mask the primary outcome.
//!
//! # The Cluster Seam
//!
//! The adapter never speaks to a cluster API directly; all operations go
//! through the [`ClusterClient`] trait. Production code implements it over
//! the deployment's Kubernetes client; tests substitute an in-memory fake
//! and drive the full lifecycle over loopback TCP.
//!
//! # Example
//!
//! ```rust,ignore
//! use podproc::{ChildSpec, FactoryConfig, PortPool, RemoteProcessFactory};
//! use std::sync::Arc;
//! use tokio::io::AsyncReadExt;
//!
//! # async fn run(client: Arc<dyn podproc::ClusterClient>) -> podproc::Result<()> {
//! let ports = Arc::new(PortPool::new(9002..9100));
//! let factory = RemoteProcessFactory::new(client, FactoryConfig::new("jobs", 9000), ports);
//!
//! let process = factory
//!     .create(
//!         ChildSpec::new("sync-42", "connector:dev")
//!             .with_file("config.json", "{}")
//!             .with_args(vec!["--sync".to_string()]),
//!     )
//!     .await?;
//!
//! let mut stdout = process.stdout()?;
//! let mut output = Vec::new();
//! let (exit, _) = tokio::join!(process.wait(), stdout.read_to_end(&mut output));
//! assert_eq!(exit?, 0);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Internal Modules
// =============================================================================

mod shell;

// =============================================================================
// Public Modules
// =============================================================================

/// Cluster client trait and pod status types.
pub mod client;

/// Paths, images, ports, timeouts, exit codes.
pub mod constants;

/// Probe-based entrypoint introspection.
pub mod entrypoint;

/// Error and result types.
pub mod error;

/// Per-child orchestration and deployment configuration.
pub mod factory;

/// Config-file injection into the init container.
pub mod inject;

/// Workload and pod manifest types.
pub mod manifest;

/// Shared pool of caller-side relay ports.
pub mod ports;

/// The remote-process adapter itself.
pub mod process;

/// Multi-container workload assembly.
pub mod workload;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{ClusterClient, ContainerState, ContainerStateKind, PodPhase, PodPredicate, PodSnapshot};
pub use error::{Error, Result};
pub use factory::{FactoryConfig, RemoteProcessFactory};
pub use manifest::{
    ContainerPort, ContainerSpec, PodManifest, PodTemplate, RestartPolicy, Volume, VolumeMount,
    WorkloadManifest,
};
pub use ports::PortPool;
pub use process::{ChildSpec, PortReleaser, RemoteProcess, StdinStream};
