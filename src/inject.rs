//! Config-file injection into the init container.
//!
//! The init container idles until the upload sentinel appears, which keeps
//! it in the running state long enough for files to be streamed into the
//! shared `/config` volume. Uploads happen in the caller's insertion order;
//! the sentinel goes last, strictly after every caller file, because its
//! presence releases the init container and lets the primary start.

use crate::client::ClusterClient;
use crate::constants::{CONFIG_DIR, INIT_RUNNING_TIMEOUT, SUCCESS_FILE_NAME};
use crate::error::{Error, Result};
use crate::workload::INIT_CONTAINER_NAME;
use indexmap::IndexMap;
use tracing::{debug, info};

/// Uploads the caller's config files plus the release sentinel.
///
/// Waits for the pod to expose an init-container status, then for that
/// container to be running, both bounded by [`INIT_RUNNING_TIMEOUT`].
///
/// # Errors
///
/// - [`Error::PodWaitTimeout`] when the init container never runs.
/// - [`Error::PodVanished`] when the pod is deleted mid-injection.
/// - Cluster or I/O errors from the individual uploads.
pub async fn upload_config_files(
    client: &dyn ClusterClient,
    namespace: &str,
    pod: &str,
    files: &IndexMap<String, String>,
) -> Result<()> {
    info!(pod, "waiting for init container before copying files");
    await_init_running(client, namespace, pod).await?;
    info!(pod, count = files.len(), "init container running, copying files");

    for (name, contents) in files {
        upload_one(client, namespace, pod, name, contents).await?;
    }

    // The sentinel releases the init container; it must land last.
    upload_one(client, namespace, pod, SUCCESS_FILE_NAME, "").await?;
    info!(pod, "finished copying files");
    Ok(())
}

async fn await_init_running(client: &dyn ClusterClient, namespace: &str, pod: &str) -> Result<()> {
    let present = client
        .await_pod(
            namespace,
            pod,
            &|p| p.has_init_status(),
            INIT_RUNNING_TIMEOUT,
        )
        .await?;
    if present.is_none() {
        return Err(Error::PodVanished {
            pod: pod.to_string(),
        });
    }
    debug!(pod, "init container status present");

    let running = client
        .await_pod(namespace, pod, &|p| p.init_running(), INIT_RUNNING_TIMEOUT)
        .await?;
    if running.is_none() {
        return Err(Error::PodVanished {
            pod: pod.to_string(),
        });
    }
    debug!(pod, "init container running");
    Ok(())
}

/// Writes `contents` to a temp file and streams it into the init container.
async fn upload_one(
    client: &dyn ClusterClient,
    namespace: &str,
    pod: &str,
    name: &str,
    contents: &str,
) -> Result<()> {
    let tmp = tempfile::NamedTempFile::new()?;
    std::fs::write(tmp.path(), contents)?;

    debug!(pod, file = name, "uploading file");
    client
        .upload_file(
            namespace,
            pod,
            INIT_CONTAINER_NAME,
            tmp.path(),
            &format!("{CONFIG_DIR}/{name}"),
        )
        .await
    // tmp deleted on drop
}
