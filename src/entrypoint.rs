//! Entrypoint introspection via a probe pod.
//!
//! When the caller does not override the child's entrypoint, the adapter
//! has to discover what the image intends to run. The cluster API does not
//! expose image metadata, so a short-lived probe pod from the same image
//! echoes the entrypoint environment variable and exits; the value is
//! parsed out of the probe's logs.

use crate::client::{ClusterClient, PodPhase};
use crate::constants::{ENTRYPOINT_ENV_VAR, ENTRYPOINT_PROBE_TIMEOUT};
use crate::error::{Error, Result};
use crate::manifest::{ContainerSpec, PodManifest, PodTemplate, RestartPolicy};
use std::collections::HashMap;
use tracing::{info, warn};

/// Resolves the entrypoint an image declares through [`ENTRYPOINT_ENV_VAR`].
///
/// Submits a probe pod running `echo "VAR=$VAR"`, waits for it to succeed,
/// and parses the echoed value. The probe pod is deleted best-effort
/// afterwards; a failed cleanup never fails the resolution.
///
/// # Errors
///
/// - [`Error::EntrypointProbeFailed`] when the probe does not complete or
///   its logs lack the marker.
/// - [`Error::EntrypointMissing`] when the image does not set the variable.
pub async fn resolve_entrypoint(
    client: &dyn ClusterClient,
    namespace: &str,
    image: &str,
) -> Result<String> {
    let pod_name = format!("entrypoint-probe-{}", unique_suffix());
    info!(pod = %pod_name, image, "probing image entrypoint");

    let outcome = run_probe(client, namespace, &pod_name, image).await;

    if let Err(error) = client.delete_pod(namespace, &pod_name).await {
        warn!(%error, pod = %pod_name, "failed to delete entrypoint probe pod");
    }

    outcome
}

async fn run_probe(
    client: &dyn ClusterClient,
    namespace: &str,
    pod_name: &str,
    image: &str,
) -> Result<String> {
    let manifest = probe_manifest(pod_name, image);
    manifest.validate()?;
    client.create_pod(namespace, &manifest).await?;

    let snapshot = client
        .await_pod(
            namespace,
            pod_name,
            &|pod| pod.phase == PodPhase::Succeeded,
            ENTRYPOINT_PROBE_TIMEOUT,
        )
        .await?;
    if snapshot.is_none() {
        return Err(Error::EntrypointProbeFailed {
            image: image.to_string(),
            reason: "probe pod disappeared before completing".to_string(),
        });
    }

    let logs = client.pod_logs(namespace, pod_name).await?;
    parse_entrypoint(&logs, image)
}

/// Builds the probe pod manifest: one container echoing the entrypoint var.
fn probe_manifest(pod_name: &str, image: &str) -> PodManifest {
    let echo = format!("echo \"{ENTRYPOINT_ENV_VAR}=${ENTRYPOINT_ENV_VAR}\"");
    PodManifest {
        name: pod_name.to_string(),
        labels: HashMap::new(),
        template: PodTemplate {
            labels: HashMap::new(),
            restart_policy: RestartPolicy::Never,
            init_containers: Vec::new(),
            containers: vec![ContainerSpec::shell("entrypoint-probe", image, echo)],
            volumes: Vec::new(),
        },
    }
}

/// Extracts the entrypoint value from the probe's log output.
fn parse_entrypoint(logs: &str, image: &str) -> Result<String> {
    let marker = format!("{ENTRYPOINT_ENV_VAR}=");
    let line = logs
        .lines()
        .find(|line| line.contains(&marker))
        .ok_or_else(|| Error::EntrypointProbeFailed {
            image: image.to_string(),
            reason: format!("probe logs are missing the {ENTRYPOINT_ENV_VAR} marker"),
        })?;

    // The marker line always contains '=': it matched on `marker` above.
    let value = line.split_once('=').map_or("", |(_, value)| value).trim();
    if value.is_empty() {
        return Err(Error::EntrypointMissing {
            image: image.to_string(),
        });
    }

    Ok(value.to_string())
}

/// Short random suffix for unique probe pod names.
///
/// Takes the tail of a v7 uuid: the leading digits are timestamp bits and
/// would collide for probes launched in the same instant.
fn unique_suffix() -> String {
    let id = uuid::Uuid::now_v7().simple().to_string();
    id[id.len() - 8..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_the_value() {
        let logs = "AIRBYTE_ENTRYPOINT=python /airbyte/integration_code/main.py\n";
        assert_eq!(
            parse_entrypoint(logs, "img").unwrap(),
            "python /airbyte/integration_code/main.py"
        );
    }

    #[test]
    fn parse_skips_unrelated_lines() {
        let logs = "warming up\nAIRBYTE_ENTRYPOINT=/entry\ndone\n";
        assert_eq!(parse_entrypoint(logs, "img").unwrap(), "/entry");
    }

    #[test]
    fn missing_marker_is_a_probe_failure() {
        let err = parse_entrypoint("nothing useful\n", "img").unwrap_err();
        assert!(matches!(err, Error::EntrypointProbeFailed { .. }));
    }

    #[test]
    fn empty_value_means_the_image_lacks_an_entrypoint() {
        let err = parse_entrypoint("AIRBYTE_ENTRYPOINT=\n", "img").unwrap_err();
        assert!(matches!(err, Error::EntrypointMissing { .. }));
    }

    #[test]
    fn probe_manifest_echoes_the_variable() {
        let manifest = probe_manifest("entrypoint-probe-abc123", "connector:dev");
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.template.containers.len(), 1);
        assert_eq!(
            manifest.template.containers[0].command[2],
            "echo \"AIRBYTE_ENTRYPOINT=$AIRBYTE_ENTRYPOINT\""
        );
    }

    #[test]
    fn suffixes_are_name_safe() {
        let suffix = unique_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
