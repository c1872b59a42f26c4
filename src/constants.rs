//! Constants for the remote-process adapter.
//!
//! All paths, images, ports, timeouts and exit codes are defined here to
//! keep magic values out of the lifecycle code.

use std::time::Duration;

// =============================================================================
// In-Pod Filesystem Layout
// =============================================================================

/// Directory holding the stdio FIFOs, backed by a shared scratch volume.
pub const PIPES_DIR: &str = "/pipes";

/// FIFO coupling the caller's writes to the child's stdin.
pub const STDIN_PIPE_FILE: &str = "/pipes/stdin";

/// FIFO coupling the child's stdout to the relay sidecar.
pub const STDOUT_PIPE_FILE: &str = "/pipes/stdout";

/// FIFO coupling the child's stderr to the relay sidecar.
pub const STDERR_PIPE_FILE: &str = "/pipes/stderr";

/// Directory the caller's config files are injected into.
/// Also the working directory of the init and main containers.
pub const CONFIG_DIR: &str = "/config";

/// Directory for the termination handshake between main and sidecars.
pub const TERMINATION_DIR: &str = "/termination";

/// File the main container's exit trap touches. Sidecar watchdogs poll it.
pub const TERMINATION_FILE_MAIN: &str = "/termination/main";

/// Sentinel whose presence releases the init container after file injection.
/// Uploaded last, strictly after every caller-supplied file.
pub const SUCCESS_FILE_NAME: &str = "FINISHED_UPLOADING";

// =============================================================================
// Container Images
// =============================================================================

/// Image for the init container that creates the FIFOs.
pub const INIT_IMAGE: &str = "busybox:1.28";

/// Image for the socat relay sidecars.
pub const SOCAT_IMAGE: &str = "alpine/socat:1.7.4.1-r1";

/// Image for the heartbeat-caller sidecar.
pub const CURL_IMAGE: &str = "curlimages/curl:7.77.0";

// =============================================================================
// Entrypoint Introspection
// =============================================================================

/// Environment variable an image must set to declare its entrypoint.
pub const ENTRYPOINT_ENV_VAR: &str = "AIRBYTE_ENTRYPOINT";

/// How long the probe pod may take to reach the Succeeded phase.
pub const ENTRYPOINT_PROBE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

// =============================================================================
// Ports & Exit Codes
// =============================================================================

/// In-pod TCP port the stdin relay listens on when stdin is used.
pub const DEFAULT_STDIN_PORT: u16 = 9001;

/// Exit code reported when the pod vanished after a kill was issued.
/// 143 is the conventional SIGTERM exit value.
pub const KILLED_EXIT_CODE: i32 = 143;

// =============================================================================
// Timeouts & Poll Intervals
// =============================================================================

/// How long a submitted workload may take to produce a labelled pod.
pub const POD_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the init container may take to reach the running state.
pub const INIT_RUNNING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Ceiling on waits for readiness or termination. The adapter is expected
/// to run under a supervisor, so this bound is deliberately generous.
pub const TERMINAL_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Timeout for the outbound stdin dial once the pod is ready.
pub const STDIN_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Seconds between init-container polls for the upload sentinel.
pub const SENTINEL_POLL_SECS: u64 = 5;

/// Seconds between sidecar watchdog polls for the termination file.
pub const WATCHDOG_POLL_SECS: u64 = 1;

// =============================================================================
// Workload Housekeeping
// =============================================================================

/// Label the workload stamps onto its pod template, used for pod lookup.
pub const JOB_NAME_LABEL: &str = "job-name";

/// Default time-to-live for finished workloads before garbage collection.
pub const DEFAULT_WORKLOAD_TTL_SECS: u32 = 60 * 60;
