//! Workload assembly.
//!
//! Builds the full multi-container workload that hosts one remote child:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Pod                                                            │
//! │                                                                 │
//! │  init ──(FIFOs, waits for sentinel)──▶ exits ──▶ main starts    │
//! │                                                                 │
//! │  main ─── stdout ──▶ /pipes/stdout ──▶ relay-stdout ──▶ caller  │
//! │       ─── stderr ──▶ /pipes/stderr ──▶ relay-stderr ──▶ caller  │
//! │       ◀── stdin ──── /pipes/stdin ◀─── remote-stdin ◀── caller  │
//! │       ─── exit trap ▶ /termination/main ──▶ sidecar watchdogs   │
//! │                                                                 │
//! │  call-heartbeat-server ──▶ GET caller's heartbeat URL, 1/s      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three emptyDir scratch volumes couple the containers: `/pipes` for the
//! stdio FIFOs, `/config` for injected files, `/termination` for the
//! primary's death certificate.

use crate::constants::{
    CONFIG_DIR, CURL_IMAGE, INIT_IMAGE, JOB_NAME_LABEL, PIPES_DIR, SOCAT_IMAGE,
    STDIN_PIPE_FILE, STDOUT_PIPE_FILE, STDERR_PIPE_FILE, TERMINATION_DIR,
};
use crate::error::Result;
use crate::manifest::{
    ContainerSpec, PodTemplate, RestartPolicy, Volume, VolumeMount, WorkloadManifest,
};
use crate::shell;
use std::collections::HashMap;

// =============================================================================
// Container & Volume Names
// =============================================================================

/// Init container creating the FIFOs and gating on the upload sentinel.
pub const INIT_CONTAINER_NAME: &str = "init";

/// The primary container running the user's image.
pub const MAIN_CONTAINER_NAME: &str = "main";

/// Sidecar piping `/pipes/stdout` to the caller.
pub const RELAY_STDOUT_CONTAINER_NAME: &str = "relay-stdout";

/// Sidecar piping `/pipes/stderr` to the caller.
pub const RELAY_STDERR_CONTAINER_NAME: &str = "relay-stderr";

/// Sidecar accepting the caller's stdin connection.
pub const REMOTE_STDIN_CONTAINER_NAME: &str = "remote-stdin";

/// Sidecar polling the caller's heartbeat endpoint.
pub const HEARTBEAT_CONTAINER_NAME: &str = "call-heartbeat-server";

/// Scratch volume for the stdio FIFOs.
pub const PIPES_VOLUME: &str = "airbyte-pipes";

/// Scratch volume for injected config files.
pub const CONFIG_VOLUME: &str = "airbyte-config";

/// Scratch volume for the termination handshake.
pub const TERMINATION_VOLUME: &str = "airbyte-termination";

// =============================================================================
// Workload Construction
// =============================================================================

/// Everything the builder needs to assemble one child's workload.
#[derive(Debug)]
pub struct WorkloadConfig<'a> {
    /// Base name for the pod; the workload is named `job-<pod_name>`.
    pub pod_name: &'a str,
    /// The user image the primary container runs.
    pub image: &'a str,
    /// The resolved entrypoint, ready for argument concatenation.
    pub entrypoint: &'a str,
    /// Command-line arguments, joined by spaces after the entrypoint.
    pub args: &'a [String],
    /// Whether the caller will write to the child's stdin.
    pub uses_stdin: bool,
    /// Caller host address the relay sidecars dial back to.
    pub caller_host: &'a str,
    /// Caller port receiving the child's stdout.
    pub stdout_port: u16,
    /// Caller port receiving the child's stderr.
    pub stderr_port: u16,
    /// In-pod port the stdin relay listens on.
    pub stdin_port: u16,
    /// URL the heartbeat sidecar polls once per second.
    pub heartbeat_url: &'a str,
    /// TTL for the finished workload.
    pub ttl_seconds: u32,
}

/// Derives the workload name from the pod base name.
#[must_use]
pub fn workload_name(pod_name: &str) -> String {
    format!("job-{pod_name}")
}

/// Assembles and validates the complete workload manifest.
pub fn build_workload(cfg: &WorkloadConfig<'_>) -> Result<WorkloadManifest> {
    let pipes = VolumeMount::new(PIPES_VOLUME, PIPES_DIR);
    let config = VolumeMount::new(CONFIG_VOLUME, CONFIG_DIR);
    let termination = VolumeMount::new(TERMINATION_VOLUME, TERMINATION_DIR);

    let init = ContainerSpec::shell(
        INIT_CONTAINER_NAME,
        INIT_IMAGE,
        shell::init_command(cfg.uses_stdin),
    )
    .with_working_dir(CONFIG_DIR)
    .with_mounts([pipes.clone(), config.clone()]);

    let main = ContainerSpec::shell(
        MAIN_CONTAINER_NAME,
        cfg.image,
        shell::main_command(cfg.entrypoint, cfg.args, cfg.uses_stdin),
    )
    .with_working_dir(CONFIG_DIR)
    .with_mounts([pipes.clone(), config.clone(), termination.clone()]);

    let relay_stdout = ContainerSpec::shell(
        RELAY_STDOUT_CONTAINER_NAME,
        SOCAT_IMAGE,
        shell::with_happy_closer(&format!(
            "cat {STDOUT_PIPE_FILE} | socat -d -d -d - TCP:{}:{}",
            cfg.caller_host, cfg.stdout_port
        )),
    )
    .with_mounts([pipes.clone(), termination.clone()]);

    let relay_stderr = ContainerSpec::shell(
        RELAY_STDERR_CONTAINER_NAME,
        SOCAT_IMAGE,
        shell::with_happy_closer(&format!(
            "cat {STDERR_PIPE_FILE} | socat -d -d -d - TCP:{}:{}",
            cfg.caller_host, cfg.stderr_port
        )),
    )
    .with_mounts([pipes.clone(), termination.clone()]);

    let mut containers = vec![main, relay_stdout, relay_stderr];

    if cfg.uses_stdin {
        let remote_stdin = ContainerSpec::shell(
            REMOTE_STDIN_CONTAINER_NAME,
            SOCAT_IMAGE,
            shell::with_happy_closer(&format!(
                "socat -d -d -d TCP-L:{} STDOUT > {STDIN_PIPE_FILE}",
                cfg.stdin_port
            )),
        )
        .with_port(cfg.stdin_port)
        .with_mounts([pipes.clone(), termination.clone()]);
        containers.push(remote_stdin);
    }

    let heartbeat = ContainerSpec::shell(
        HEARTBEAT_CONTAINER_NAME,
        CURL_IMAGE,
        shell::with_sad_closer(&shell::heartbeat_loop(cfg.heartbeat_url)),
    )
    .with_mounts([termination]);
    containers.push(heartbeat);

    let name = workload_name(cfg.pod_name);
    let labels = HashMap::from([(JOB_NAME_LABEL.to_string(), name.clone())]);

    let manifest = WorkloadManifest {
        name,
        labels: labels.clone(),
        ttl_seconds_after_finished: Some(cfg.ttl_seconds),
        template: PodTemplate {
            labels,
            restart_policy: RestartPolicy::Never,
            init_containers: vec![init],
            containers,
            volumes: vec![
                Volume {
                    name: PIPES_VOLUME.to_string(),
                },
                Volume {
                    name: CONFIG_VOLUME.to_string(),
                },
                Volume {
                    name: TERMINATION_VOLUME.to_string(),
                },
            ],
        },
    };
    manifest.validate()?;
    Ok(manifest)
}
