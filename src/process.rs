//! The remote-process adapter.
//!
//! [`RemoteProcess`] makes one container running in the cluster behave
//! like a local child process. Startup choreography:
//!
//! 1. Bind the stdout/stderr listeners and arm one acceptor task each,
//!    so no relay byte can arrive before someone is listening.
//! 2. Resolve the child's entrypoint (probe pod, unless overridden).
//! 3. Build and submit the multi-container workload.
//! 4. Locate the pod via the workload label.
//! 5. Wait for the init container to run, then inject the config files
//!    and the release sentinel.
//! 6. Wait until the pod is ready (streaming can proceed) or terminal
//!    (it crashed before ever becoming ready).
//! 7. Dial the pod's stdin listener, when stdin is used.
//!
//! Any failure after step 1 tears the adapter back down: acceptors are
//! aborted, both ports are released, and a submitted workload is deleted
//! best-effort. Construction is all-or-nothing.

use crate::client::ClusterClient;
use crate::constants::{
    JOB_NAME_LABEL, KILLED_EXIT_CODE, POD_LOOKUP_TIMEOUT, STDIN_DIAL_TIMEOUT,
    TERMINAL_WAIT_TIMEOUT,
};
use crate::entrypoint;
use crate::error::{Error, Result};
use crate::factory::FactoryConfig;
use crate::inject;
use crate::workload::{self, WorkloadConfig};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between pod-lookup attempts after workload submission.
const POD_LOOKUP_POLL: Duration = Duration::from_millis(500);

/// Callback returning a relay port to its pool. Supplied by the factory.
pub type PortReleaser = Arc<dyn Fn(u16) + Send + Sync>;

/// Writable handle to the child's stdin. A null sink when stdin is unused.
pub type StdinStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Slot an acceptor task stores its connection's read half into.
type StreamSlot = Arc<Mutex<Option<OwnedReadHalf>>>;

// =============================================================================
// Child Specification
// =============================================================================

/// Everything the caller specifies about one remote child.
#[derive(Debug)]
pub struct ChildSpec {
    /// Base name for the pod; must be a valid cluster resource name.
    pub pod_name: String,
    /// Image to run.
    pub image: String,
    /// Entrypoint override. `None` triggers probe-based resolution.
    pub entrypoint_override: Option<String>,
    /// Command-line arguments for the child.
    pub args: Vec<String>,
    /// Config files injected into `/config`, uploaded in insertion order.
    pub files: IndexMap<String, String>,
    /// Whether the caller will write to the child's stdin.
    pub uses_stdin: bool,
}

impl ChildSpec {
    /// Creates a spec with no arguments, no files, and stdin unused.
    pub fn new(pod_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            image: image.into(),
            entrypoint_override: None,
            args: Vec::new(),
            files: IndexMap::new(),
            uses_stdin: false,
        }
    }

    /// Overrides the image's entrypoint, skipping the probe.
    #[must_use]
    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint_override = Some(entrypoint.into());
        self
    }

    /// Sets the child's command-line arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Adds a config file to inject.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }

    /// Declares that the caller will write to the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self) -> Self {
        self.uses_stdin = true;
        self
    }
}

// =============================================================================
// Remote Process
// =============================================================================

/// A child process backed by a pod in the cluster.
///
/// Streams already taken by the caller stay open across [`close`]; the
/// adapter only closes resources it still holds.
///
/// [`close`]: RemoteProcess::close
pub struct RemoteProcess {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    workload_name: String,
    pod_name: String,
    stdin: Mutex<Option<StdinStream>>,
    stdout: StreamSlot,
    stderr: StreamSlot,
    acceptors: Mutex<Vec<JoinHandle<()>>>,
    stdout_port: u16,
    stderr_port: u16,
    release_port: PortReleaser,
    killed: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("namespace", &self.namespace)
            .field("workload_name", &self.workload_name)
            .field("pod_name", &self.pod_name)
            .field("stdout_port", &self.stdout_port)
            .field("stderr_port", &self.stderr_port)
            .field("killed", &self.killed)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RemoteProcess {
    /// Launches the child. Called by the factory, which owns port checkout.
    pub(crate) async fn start(
        client: Arc<dyn ClusterClient>,
        config: &FactoryConfig,
        child: ChildSpec,
        stdout_port: u16,
        stderr_port: u16,
        release_port: PortReleaser,
    ) -> Result<Self> {
        let stdout_slot: StreamSlot = Arc::new(Mutex::new(None));
        let stderr_slot: StreamSlot = Arc::new(Mutex::new(None));

        // Step 1: arm both listeners before anything can dial back.
        let acceptors = match Self::arm_listeners(
            stdout_port,
            stderr_port,
            Arc::clone(&stdout_slot),
            Arc::clone(&stderr_slot),
        )
        .await
        {
            Ok(acceptors) => acceptors,
            Err(error) => {
                release_port(stdout_port);
                release_port(stderr_port);
                return Err(error);
            }
        };

        match Self::bootstrap(&client, config, &child, stdout_port, stderr_port).await {
            Ok((workload_name, pod_name, stdin)) => Ok(Self {
                client,
                namespace: config.namespace.clone(),
                workload_name,
                pod_name,
                stdin: Mutex::new(Some(stdin)),
                stdout: stdout_slot,
                stderr: stderr_slot,
                acceptors: Mutex::new(acceptors),
                stdout_port,
                stderr_port,
                release_port,
                killed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            Err(error) => {
                for handle in &acceptors {
                    handle.abort();
                }
                release_port(stdout_port);
                release_port(stderr_port);
                Err(error)
            }
        }
    }

    async fn arm_listeners(
        stdout_port: u16,
        stderr_port: u16,
        stdout_slot: StreamSlot,
        stderr_slot: StreamSlot,
    ) -> Result<Vec<JoinHandle<()>>> {
        let stdout_listener = TcpListener::bind(("0.0.0.0", stdout_port)).await?;
        let stderr_listener = TcpListener::bind(("0.0.0.0", stderr_port)).await?;
        debug!(stdout_port, stderr_port, "relay listeners bound");

        Ok(vec![
            spawn_acceptor(stdout_listener, stdout_slot, "stdout"),
            spawn_acceptor(stderr_listener, stderr_slot, "stderr"),
        ])
    }

    /// Steps 2–3: entrypoint resolution, workload assembly, submission.
    async fn bootstrap(
        client: &Arc<dyn ClusterClient>,
        config: &FactoryConfig,
        child: &ChildSpec,
        stdout_port: u16,
        stderr_port: u16,
    ) -> Result<(String, String, StdinStream)> {
        let entrypoint = match &child.entrypoint_override {
            Some(entrypoint) => entrypoint.clone(),
            None => {
                entrypoint::resolve_entrypoint(client.as_ref(), &config.namespace, &child.image)
                    .await?
            }
        };
        info!(entrypoint = %entrypoint, image = %child.image, "resolved child entrypoint");

        let caller_host = match &config.caller_host {
            Some(host) => host.clone(),
            None => local_host_address()?,
        };
        let heartbeat_host = config
            .heartbeat_host
            .clone()
            .unwrap_or_else(|| caller_host.clone());
        let heartbeat_url = format!("{heartbeat_host}:{}", config.heartbeat_port);

        let manifest = workload::build_workload(&WorkloadConfig {
            pod_name: &child.pod_name,
            image: &child.image,
            entrypoint: &entrypoint,
            args: &child.args,
            uses_stdin: child.uses_stdin,
            caller_host: &caller_host,
            stdout_port,
            stderr_port,
            stdin_port: config.stdin_port,
            heartbeat_url: &heartbeat_url,
            ttl_seconds: config.workload_ttl_seconds,
        })?;

        info!(workload = %manifest.name, "submitting workload");
        client.create_workload(&config.namespace, &manifest).await?;

        // A submitted workload must not outlive a failed construction.
        match Self::attach(client, config, child, &manifest.name).await {
            Ok((pod_name, stdin)) => Ok((manifest.name, pod_name, stdin)),
            Err(error) => {
                if let Err(delete_error) = client
                    .delete_workload(&config.namespace, &manifest.name)
                    .await
                {
                    warn!(
                        %delete_error,
                        workload = %manifest.name,
                        "failed to delete workload after startup failure"
                    );
                }
                Err(error)
            }
        }
    }

    /// Steps 4–7: pod lookup, file injection, readiness, stdin attach.
    async fn attach(
        client: &Arc<dyn ClusterClient>,
        config: &FactoryConfig,
        child: &ChildSpec,
        workload_name: &str,
    ) -> Result<(String, StdinStream)> {
        let pod_name = Self::find_pod(client.as_ref(), &config.namespace, workload_name).await?;

        inject::upload_config_files(client.as_ref(), &config.namespace, &pod_name, &child.files)
            .await?;

        info!(pod = %pod_name, "waiting until pod is ready");
        client
            .await_pod(
                &config.namespace,
                &pod_name,
                &|pod| pod.is_ready() || pod.is_terminal(),
                TERMINAL_WAIT_TIMEOUT,
            )
            .await?
            .ok_or_else(|| Error::PodVanished {
                pod: pod_name.clone(),
            })?;

        let stdin: StdinStream = if child.uses_stdin {
            let pod = client
                .get_pod(&config.namespace, &pod_name)
                .await?
                .ok_or_else(|| Error::PodVanished {
                    pod: pod_name.clone(),
                })?;
            let pod_ip = pod.pod_ip.ok_or_else(|| Error::PodAddressUnknown {
                pod: pod_name.clone(),
            })?;

            info!(pod = %pod_name, ip = %pod_ip, port = config.stdin_port, "attaching stdin socket");
            let stream = tokio::time::timeout(
                STDIN_DIAL_TIMEOUT,
                TcpStream::connect((pod_ip.as_str(), config.stdin_port)),
            )
            .await
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "stdin dial timed out",
                ))
            })??;
            let (read_half, write_half) = stream.into_split();
            drop(read_half);
            Box::new(write_half)
        } else {
            debug!(pod = %pod_name, "stdin unused, using null sink");
            Box::new(tokio::io::sink())
        };

        Ok((pod_name, stdin))
    }

    async fn find_pod(
        client: &dyn ClusterClient,
        namespace: &str,
        workload_name: &str,
    ) -> Result<String> {
        let deadline = tokio::time::Instant::now() + POD_LOOKUP_TIMEOUT;
        loop {
            let pods = client
                .list_pods_by_label(namespace, JOB_NAME_LABEL, workload_name)
                .await?;
            if let Some(pod) = pods.into_iter().next() {
                info!(pod = %pod.name, workload = workload_name, "located workload pod");
                return Ok(pod.name);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::PodNotScheduled {
                    workload: workload_name.to_string(),
                    timeout: POD_LOOKUP_TIMEOUT,
                });
            }
            tokio::time::sleep(POD_LOOKUP_POLL).await;
        }
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Takes the writable stdin stream. A null sink when stdin is unused.
    ///
    /// # Errors
    ///
    /// [`Error::StreamUnavailable`] if taken twice or already closed.
    pub fn stdin(&self) -> Result<StdinStream> {
        lock(&self.stdin)
            .take()
            .ok_or(Error::StreamUnavailable { stream: "stdin" })
    }

    /// Takes the child's stdout stream.
    ///
    /// Safe to call once construction has returned and [`wait`] begins;
    /// errors if the relay sidecar has not connected yet or the stream was
    /// already taken.
    ///
    /// [`wait`]: RemoteProcess::wait
    pub fn stdout(&self) -> Result<OwnedReadHalf> {
        lock(&self.stdout)
            .take()
            .ok_or(Error::StreamUnavailable { stream: "stdout" })
    }

    /// Takes the child's stderr stream. Same availability as [`stdout`].
    ///
    /// [`stdout`]: RemoteProcess::stdout
    pub fn stderr(&self) -> Result<OwnedReadHalf> {
        lock(&self.stderr)
            .take()
            .ok_or(Error::StreamUnavailable { stream: "stderr" })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Blocks until the pod is terminal and returns the exit code.
    ///
    /// Always closes the adapter's resources, whatever the outcome.
    pub async fn wait(&self) -> Result<i32> {
        let result = self.await_exit().await;
        self.close();
        result
    }

    async fn await_exit(&self) -> Result<i32> {
        info!(pod = %self.pod_name, "waiting for pod to terminate");
        self.client
            .await_pod(
                &self.namespace,
                &self.pod_name,
                &|pod| pod.is_terminal(),
                TERMINAL_WAIT_TIMEOUT,
            )
            .await?;
        self.killed.store(true, Ordering::SeqCst);
        self.exit_value().await
    }

    /// Bounded wait: returns whether the child terminated within `timeout`.
    ///
    /// Always closes the adapter's resources, whatever the outcome.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let result = match self
            .client
            .await_pod(
                &self.namespace,
                &self.pod_name,
                &|pod| pod.is_terminal(),
                timeout,
            )
            .await
        {
            // Terminal, or deleted out from under us; either way it exited.
            Ok(_) => Ok(true),
            Err(Error::PodWaitTimeout { .. }) => Ok(false),
            Err(error) => Err(error),
        };
        self.close();
        result
    }

    /// Forcibly terminates the workload with foreground deletion.
    ///
    /// Safe to call at any point after construction; races with [`wait`]
    /// through the killed-flag. Always closes the adapter's resources.
    ///
    /// [`wait`]: RemoteProcess::wait
    pub async fn destroy(&self) -> Result<()> {
        info!(workload = %self.workload_name, "destroying remote process");
        let result = self
            .client
            .delete_workload(&self.namespace, &self.workload_name)
            .await;
        if result.is_ok() {
            self.killed.store(true, Ordering::SeqCst);
        }
        self.close();
        result
    }

    /// Returns the child's exit code once the pod is terminal.
    ///
    /// The cluster keeps no single "primary exit code" for a finished pod,
    /// so the adapter sums the exit codes of every terminated container:
    /// zero only when everything exited cleanly, and any sidecar failure
    /// taints the result. A vanished pod maps to [`KILLED_EXIT_CODE`] when
    /// this adapter issued the kill, and to an error otherwise.
    pub async fn exit_value(&self) -> Result<i32> {
        let Some(pod) = self.client.get_pod(&self.namespace, &self.pod_name).await? else {
            if self.killed.load(Ordering::SeqCst) {
                info!(
                    pod = %self.pod_name,
                    code = KILLED_EXIT_CODE,
                    "pod is gone after a kill; reporting the killed exit code"
                );
                return Ok(KILLED_EXIT_CODE);
            }
            return Err(Error::PodVanished {
                pod: self.pod_name.clone(),
            });
        };

        if !pod.is_terminal() {
            return Err(Error::NotTerminated {
                pod: self.pod_name.clone(),
            });
        }

        for container in &pod.containers {
            if let Some(code) = container.exit_code() {
                info!(pod = %self.pod_name, container = %container.name, code, "container exited");
            }
        }
        Ok(pod.terminated_exit_sum())
    }

    /// Releases all adapter-held resources. Idempotent; every teardown
    /// error is swallowed so partial failure cannot skip a step or mask
    /// the primary outcome.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(pod = %self.pod_name, "closing adapter resources");

        drop(lock(&self.stdin).take());
        drop(lock(&self.stdout).take());
        drop(lock(&self.stderr).take());
        for handle in lock(&self.acceptors).drain(..) {
            handle.abort();
        }
        (self.release_port)(self.stdout_port);
        (self.release_port)(self.stderr_port);
        info!(pod = %self.pod_name, "adapter closed, ports released");
    }

    /// Name of the pod backing this process.
    #[must_use]
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// Name of the workload backing this process.
    #[must_use]
    pub fn workload_name(&self) -> &str {
        &self.workload_name
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// One-accept-then-store-then-exit: awaits a single inbound connection and
/// parks its read half in the slot for the caller to take.
fn spawn_acceptor(listener: TcpListener, slot: StreamSlot, label: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(stream = label, %peer, "sidecar connected");
                let (read_half, _write_half) = stream.into_split();
                *lock(&slot) = Some(read_half);
            }
            Err(error) => {
                warn!(stream = label, %error, "accept failed; stream will be unavailable");
            }
        }
    })
}

/// Discovers the caller's address as seen from the cluster network.
///
/// Connecting a UDP socket performs the routing lookup without sending a
/// packet; the chosen source address is the one sidecars can dial back.
fn local_host_address() -> Result<String> {
    let probe = || -> std::io::Result<String> {
        let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(("8.8.8.8", 53))?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().map_err(|error| Error::HostAddressUnknown(error.to_string()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
