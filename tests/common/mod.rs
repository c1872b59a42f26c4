//! In-memory cluster fake for integration tests.
//!
//! `FakeCluster` implements the `ClusterClient` trait against a mutable
//! in-memory pod table, and simulates the pod-internal choreography the
//! real workload performs: when the upload sentinel lands it "releases"
//! the init container, brings the main containers up, dials the caller's
//! relay ports over loopback TCP, and finally drives the pod to a
//! terminal state. Tests configure the simulation through `FakeBehavior`.

#![allow(dead_code)]

use async_trait::async_trait;
use podproc::client::{
    ClusterClient, ContainerState, ContainerStateKind, PodPhase, PodPredicate, PodSnapshot,
};
use podproc::error::{Error, Result};
use podproc::manifest::{PodManifest, WorkloadManifest};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Picks a free loopback port by binding and immediately dropping.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Marker the fake recognizes as the upload sentinel.
const SENTINEL: &str = "FINISHED_UPLOADING";

// =============================================================================
// Behavior Configuration
// =============================================================================

/// How the fake cluster plays the pod side of the protocol.
#[derive(Clone, Default)]
pub struct FakeBehavior {
    /// Value echoed by entrypoint probe pods. `None` produces logs without
    /// the marker, failing resolution.
    pub probe_entrypoint: Option<String>,
    /// Caller (stdout, stderr) ports the simulated relay sidecars dial.
    /// `None` disables the sidecar simulation entirely.
    pub caller_ports: Option<(u16, u16)>,
    /// Loopback port the simulated stdin listener binds, for echo mode.
    pub stdin_listen_port: Option<u16>,
    /// Bytes the simulated child writes to stdout.
    pub stdout_payload: Vec<u8>,
    /// Bytes the simulated child writes to stderr.
    pub stderr_payload: Vec<u8>,
    /// Write the concatenation of the uploaded config files to stdout
    /// instead of `stdout_payload`.
    pub stdout_from_files: bool,
    /// Echo everything received on the stdin listener to stdout.
    pub echo_stdin: bool,
    /// Container exit codes applied when the pod completes. `None` means
    /// every container exits zero. Containers absent from the list keep
    /// running (used to simulate a dying sidecar).
    pub terminal_states: Option<Vec<(String, i32)>>,
    /// Keep the pod running forever after the streams finish.
    pub hold_terminal: bool,
    /// Leave the init container waiting forever.
    pub init_never_runs: bool,
}

// =============================================================================
// Cluster State
// =============================================================================

#[derive(Default)]
struct ClusterState {
    pods: HashMap<String, PodSnapshot>,
    pod_labels: HashMap<String, HashMap<String, String>>,
    workloads: HashMap<String, WorkloadManifest>,
    workload_pod: HashMap<String, String>,
    uploads: Vec<(String, String)>,
    deleted_pods: Vec<String>,
    deleted_workloads: Vec<String>,
}

pub struct FakeCluster {
    behavior: FakeBehavior,
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    /// Uploaded `(remote path, contents)` pairs, in upload order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn workload_names(&self) -> Vec<String> {
        self.state.lock().unwrap().workloads.keys().cloned().collect()
    }

    pub fn deleted_workloads(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_workloads.clone()
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_pods.clone()
    }

    /// Inserts a pod directly, bypassing workload submission.
    pub fn insert_pod(&self, snapshot: PodSnapshot) {
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(snapshot.name.clone(), snapshot);
    }

    fn release_init_and_start(&self, pod_name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state.pods.get_mut(pod_name) {
            for init in &mut pod.init_containers {
                init.state = ContainerStateKind::Terminated { exit_code: 0 };
            }
            for container in &mut pod.containers {
                container.state = ContainerStateKind::Running;
                container.ready = true;
            }
            pod.phase = PodPhase::Running;
        }
    }

    fn complete_pod(state: &Arc<Mutex<ClusterState>>, pod_name: &str, terminal: Option<&[(String, i32)]>) {
        let mut state = state.lock().unwrap();
        if let Some(pod) = state.pods.get_mut(pod_name) {
            match terminal {
                None => {
                    for container in &mut pod.containers {
                        container.ready = false;
                        container.state = ContainerStateKind::Terminated { exit_code: 0 };
                    }
                    pod.phase = PodPhase::Succeeded;
                }
                Some(states) => {
                    for (name, code) in states {
                        if let Some(container) =
                            pod.containers.iter_mut().find(|c| &c.name == name)
                        {
                            container.ready = false;
                            container.state = ContainerStateKind::Terminated { exit_code: *code };
                        }
                    }
                    pod.phase = PodPhase::Failed;
                }
            }
        }
    }
}

// =============================================================================
// Sidecar Simulation
// =============================================================================

/// Plays the relay sidecars: dial the caller's ports, deliver the child's
/// output, then drive the pod terminal.
async fn run_sidecars(
    state: Arc<Mutex<ClusterState>>,
    behavior: FakeBehavior,
    pod_name: String,
    stdin_listener: Option<TcpListener>,
    stdout_port: u16,
    stderr_port: u16,
) {
    let mut stdout_conn = TcpStream::connect(("127.0.0.1", stdout_port)).await.unwrap();
    let mut stderr_conn = TcpStream::connect(("127.0.0.1", stderr_port)).await.unwrap();

    if !behavior.stderr_payload.is_empty() {
        stderr_conn.write_all(&behavior.stderr_payload).await.unwrap();
    }
    stderr_conn.shutdown().await.ok();

    let payload: Vec<u8> = if behavior.echo_stdin {
        let (mut conn, _) = stdin_listener
            .expect("echo_stdin requires a stdin listener")
            .accept()
            .await
            .unwrap();
        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).await.unwrap();
        buf
    } else if behavior.stdout_from_files {
        state
            .lock()
            .unwrap()
            .uploads
            .iter()
            .filter(|(path, _)| !path.ends_with(SENTINEL))
            .map(|(_, contents)| contents.clone())
            .collect::<String>()
            .into_bytes()
    } else {
        behavior.stdout_payload.clone()
    };
    stdout_conn.write_all(&payload).await.unwrap();
    stdout_conn.shutdown().await.ok();

    if !behavior.hold_terminal {
        FakeCluster::complete_pod(&state, &pod_name, behavior.terminal_states.as_deref());
    }
}

// =============================================================================
// ClusterClient Implementation
// =============================================================================

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_pod(&self, namespace: &str, manifest: &PodManifest) -> Result<()> {
        let snapshot = PodSnapshot {
            name: manifest.name.clone(),
            namespace: namespace.to_string(),
            phase: PodPhase::Succeeded,
            pod_ip: None,
            init_containers: Vec::new(),
            containers: manifest
                .template
                .containers
                .iter()
                .map(|c| ContainerState {
                    name: c.name.clone(),
                    ready: false,
                    state: ContainerStateKind::Terminated { exit_code: 0 },
                })
                .collect(),
        };
        self.insert_pod(snapshot);
        Ok(())
    }

    async fn create_workload(&self, namespace: &str, manifest: &WorkloadManifest) -> Result<()> {
        let pod_name = format!("{}-pod", manifest.name);
        let init_state = if self.behavior.init_never_runs {
            ContainerStateKind::Waiting {
                reason: "PodInitializing".to_string(),
            }
        } else {
            ContainerStateKind::Running
        };
        let snapshot = PodSnapshot {
            name: pod_name.clone(),
            namespace: namespace.to_string(),
            phase: PodPhase::Pending,
            pod_ip: Some("127.0.0.1".to_string()),
            init_containers: manifest
                .template
                .init_containers
                .iter()
                .map(|c| ContainerState {
                    name: c.name.clone(),
                    ready: false,
                    state: init_state.clone(),
                })
                .collect(),
            containers: manifest
                .template
                .containers
                .iter()
                .map(|c| ContainerState {
                    name: c.name.clone(),
                    ready: false,
                    state: ContainerStateKind::Waiting {
                        reason: "PodInitializing".to_string(),
                    },
                })
                .collect(),
        };

        let mut state = self.state.lock().unwrap();
        state.pods.insert(pod_name.clone(), snapshot);
        state
            .pod_labels
            .insert(pod_name.clone(), manifest.template.labels.clone());
        state.workload_pod.insert(manifest.name.clone(), pod_name);
        state.workloads.insert(manifest.name.clone(), manifest.clone());
        Ok(())
    }

    async fn list_pods_by_label(
        &self,
        _namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<PodSnapshot>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .values()
            .filter(|pod| {
                state
                    .pod_labels
                    .get(&pod.name)
                    .is_some_and(|labels| labels.get(key).map(String::as_str) == Some(value))
            })
            .cloned()
            .collect())
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Option<PodSnapshot>> {
        Ok(self.state.lock().unwrap().pods.get(name).cloned())
    }

    async fn await_pod(
        &self,
        _namespace: &str,
        name: &str,
        predicate: &PodPredicate,
        timeout: Duration,
    ) -> Result<Option<PodSnapshot>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = self.state.lock().unwrap().pods.get(name).cloned();
            match snapshot {
                None => return Ok(None),
                Some(pod) if predicate(&pod) => return Ok(Some(pod)),
                Some(_) => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::PodWaitTimeout {
                    pod: name.to_string(),
                    operation: "condition".to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn pod_logs(&self, _namespace: &str, _name: &str) -> Result<String> {
        match &self.behavior.probe_entrypoint {
            Some(entrypoint) => Ok(format!("AIRBYTE_ENTRYPOINT={entrypoint}\n")),
            None => Ok("no entrypoint marker here\n".to_string()),
        }
    }

    async fn upload_file(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
        local: &Path,
        remote: &str,
    ) -> Result<()> {
        let contents = std::fs::read_to_string(local)?;
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((remote.to_string(), contents));

        if remote.ends_with(SENTINEL) {
            // The sentinel releases the init container; bind the stdin
            // listener first so the pod is never ready before it exists.
            let stdin_listener = match self.behavior.stdin_listen_port {
                Some(port) if self.behavior.echo_stdin => {
                    Some(TcpListener::bind(("127.0.0.1", port)).await.unwrap())
                }
                _ => None,
            };
            self.release_init_and_start(pod);

            if let Some((stdout_port, stderr_port)) = self.behavior.caller_ports {
                tokio::spawn(run_sidecars(
                    Arc::clone(&self.state),
                    self.behavior.clone(),
                    pod.to_string(),
                    stdin_listener,
                    stdout_port,
                    stderr_port,
                ));
            }
        }
        Ok(())
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pods.remove(name);
        state.deleted_pods.push(name.to_string());
        Ok(())
    }

    async fn delete_workload(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.workloads.remove(name);
        state.deleted_workloads.push(name.to_string());
        if let Some(pod_name) = state.workload_pod.remove(name) {
            state.pods.remove(&pod_name);
            state.pod_labels.remove(&pod_name);
        }
        Ok(())
    }
}
