//! Workload and pod manifest types.
//!
//! These are Kubernetes-compatible shapes for the resources the adapter
//! submits: a batch workload wrapping a multi-container pod template, and
//! a bare pod for the short-lived entrypoint probe. Manifests are built
//! programmatically and validated before submission; the cluster client
//! (see [`crate::client`]) is responsible for turning them into API calls.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Validation Limits
// =============================================================================

/// Maximum length for workload and pod names (RFC 1123 DNS subdomain).
pub const MAX_NAME_LEN: usize = 253;

/// Maximum length for container names within a pod.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

/// Maximum number of containers per pod.
pub const MAX_CONTAINERS_PER_POD: usize = 16;

/// Checks a name against the cluster's RFC 1123 label rules: non-empty,
/// bounded, lowercase alphanumerics with interior dashes.
fn validate_name(name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() || name.len() > max_len {
        return Err(Error::InvalidManifest(format!(
            "resource name must be 1..={max_len} characters, got {}",
            name.len()
        )));
    }

    let well_formed = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !well_formed {
        return Err(Error::InvalidManifest(format!(
            "'{name}' is not a valid resource name: lowercase alphanumerics with interior dashes only"
        )));
    }

    Ok(())
}

// =============================================================================
// Workload Manifest
// =============================================================================

/// A batch workload: one pod template scheduled to run exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadManifest {
    /// Workload name (RFC 1123, unique within the namespace).
    pub name: String,
    /// Labels stamped onto the workload itself.
    pub labels: HashMap<String, String>,
    /// Seconds a finished workload lingers before garbage collection.
    pub ttl_seconds_after_finished: Option<u32>,
    /// The pod this workload schedules.
    pub template: PodTemplate,
}

impl WorkloadManifest {
    /// Validates the manifest before submission.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, MAX_NAME_LEN)?;
        self.template.validate()
    }
}

/// A bare pod manifest, used for the entrypoint probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodManifest {
    /// Pod name (RFC 1123, unique within the namespace).
    pub name: String,
    /// Labels stamped onto the pod.
    pub labels: HashMap<String, String>,
    /// Pod contents.
    pub template: PodTemplate,
}

impl PodManifest {
    /// Validates the manifest before submission.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, MAX_NAME_LEN)?;
        self.template.validate()
    }
}

// =============================================================================
// Pod Template
// =============================================================================

/// Restart policy for the pod's containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    /// Containers are never restarted. The only policy the adapter uses:
    /// a retried container would re-run the child with stale pipes.
    Never,
    /// Restart failed containers.
    OnFailure,
    /// Always restart.
    Always,
}

/// The pod template: init containers, main containers, shared volumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    /// Labels stamped onto pods created from this template.
    pub labels: HashMap<String, String>,
    /// Restart policy for all containers.
    pub restart_policy: RestartPolicy,
    /// Containers run to completion, in order, before the main set starts.
    pub init_containers: Vec<ContainerSpec>,
    /// The main container set, started together.
    pub containers: Vec<ContainerSpec>,
    /// Shared scratch volumes. All volumes are ephemeral empty directories.
    pub volumes: Vec<Volume>,
}

impl PodTemplate {
    /// Validates container names, counts, and volume mount references.
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(Error::InvalidManifest(
                "at least one container required".to_string(),
            ));
        }

        let total = self.containers.len() + self.init_containers.len();
        if total > MAX_CONTAINERS_PER_POD {
            return Err(Error::InvalidManifest(format!(
                "too many containers: {total} (max {MAX_CONTAINERS_PER_POD})"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for container in self.init_containers.iter().chain(&self.containers) {
            validate_name(&container.name, MAX_CONTAINER_NAME_LEN)?;
            if !seen.insert(container.name.as_str()) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate container name '{}'",
                    container.name
                )));
            }
            for mount in &container.volume_mounts {
                if !self.volumes.iter().any(|v| v.name == mount.name) {
                    return Err(Error::InvalidManifest(format!(
                        "container '{}' mounts undeclared volume '{}'",
                        container.name, mount.name
                    )));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Container Specification
// =============================================================================

/// A single container within the pod template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container name (unique within the pod, RFC 1123 label).
    pub name: String,
    /// Image reference (e.g. "busybox:1.28").
    pub image: String,
    /// Command to run, overriding the image's entrypoint.
    pub command: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Ports the container listens on.
    pub ports: Vec<ContainerPort>,
    /// Volume mount points.
    pub volume_mounts: Vec<VolumeMount>,
}

impl ContainerSpec {
    /// Creates a container running `sh -c <script>`.
    pub fn shell(name: impl Into<String>, image: impl Into<String>, script: String) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: vec!["sh".to_string(), "-c".to_string(), script],
            working_dir: None,
            ports: Vec::new(),
            volume_mounts: Vec::new(),
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Declares a TCP port the container listens on.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(ContainerPort {
            container_port: port,
        });
        self
    }

    /// Adds volume mounts.
    #[must_use]
    pub fn with_mounts(mut self, mounts: impl IntoIterator<Item = VolumeMount>) -> Self {
        self.volume_mounts.extend(mounts);
        self
    }
}

/// A port a container listens on inside the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port number inside the pod's network namespace.
    pub container_port: u16,
}

// =============================================================================
// Volumes
// =============================================================================

/// An ephemeral empty-directory scratch volume shared between containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name, referenced by [`VolumeMount::name`].
    pub name: String,
}

/// A mount of a named volume into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Name of the volume being mounted.
    pub name: String,
    /// Absolute path inside the container.
    pub mount_path: String,
}

impl VolumeMount {
    /// Creates a mount of `name` at `mount_path`.
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_template() -> PodTemplate {
        PodTemplate {
            labels: HashMap::new(),
            restart_policy: RestartPolicy::Never,
            init_containers: Vec::new(),
            containers: vec![ContainerSpec::shell("main", "busybox:1.28", "true".into())],
            volumes: Vec::new(),
        }
    }

    #[test]
    fn valid_template_passes() {
        assert!(minimal_template().validate().is_ok());
    }

    #[test]
    fn empty_container_set_is_rejected() {
        let mut template = minimal_template();
        template.containers.clear();
        assert!(matches!(
            template.validate(),
            Err(Error::InvalidManifest(_))
        ));
    }

    #[test]
    fn duplicate_container_names_are_rejected() {
        let mut template = minimal_template();
        template
            .containers
            .push(ContainerSpec::shell("main", "busybox:1.28", "true".into()));
        let err = template.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate container name"));
    }

    #[test]
    fn undeclared_volume_mounts_are_rejected() {
        let mut template = minimal_template();
        template.containers[0]
            .volume_mounts
            .push(VolumeMount::new("ghost", "/ghost"));
        let err = template.validate().unwrap_err();
        assert!(err.to_string().contains("undeclared volume"));
    }

    #[test]
    fn uppercase_names_are_rejected() {
        let manifest = WorkloadManifest {
            name: "Job-X".to_string(),
            labels: HashMap::new(),
            ttl_seconds_after_finished: None,
            template: minimal_template(),
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn shell_constructor_wraps_the_script() {
        let spec = ContainerSpec::shell("relay", "alpine/socat:1.7.4.1-r1", "socat ...".into());
        assert_eq!(spec.command[0], "sh");
        assert_eq!(spec.command[1], "-c");
        assert_eq!(spec.command[2], "socat ...");
    }
}
