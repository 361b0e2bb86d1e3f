//! Container lifecycle
//!
//! Creates, starts and force-removes query containers. Every container is
//! labeled with the ownership marker, its run id and its version.

use crate::cancel::cancellable;
use crate::labels::container_labels;
use crate::runtime::{BindMount, ContainerRuntime, ContainerSpec};
use crate::state::RequestState;
use playground_foundation::{MetricsSink, Observation, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Directory the server reads extra config files from
const SERVER_CONFIG_DIR: &str = "/etc/clickhouse-server/config.d";

/// Creates and removes query containers
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<dyn MetricsSink>,
    custom_config_path: Option<PathBuf>,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            runtime,
            metrics,
            custom_config_path: None,
        }
    }

    /// Mount a server config file into every container to skip the slow default bootstrap
    pub fn with_custom_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_config_path = Some(path.into());
        self
    }

    /// Build the create spec for a request
    pub fn container_spec(&self, state: &RequestState) -> Result<ContainerSpec> {
        let mounts = self
            .custom_config_path
            .as_deref()
            .map(|path| BindMount {
                source: path.to_path_buf(),
                target: custom_config_target(path),
                read_only: true,
            })
            .into_iter()
            .collect();

        Ok(ContainerSpec {
            image: state.image_name()?.to_string(),
            labels: container_labels(&state.run_id, &state.version),
            mounts,
        })
    }

    /// Create and start the container for `state`, recording its id.
    ///
    /// `on_created` runs as soon as the container exists, before it is
    /// started. Whatever it returns is handed back on success and dropped on
    /// every other exit, a failed start or the future being dropped included.
    pub async fn run_container<G>(
        &self,
        cancel: &CancellationToken,
        state: &mut RequestState,
        on_created: impl FnOnce(&str) -> G,
    ) -> Result<G> {
        let spec = self.container_spec(state)?;

        let invoked_at = Instant::now();
        let created = cancellable(cancel, self.runtime.create_container(&spec)).await;
        self.metrics.observe(Observation::CreateContainer {
            ok: created.is_ok(),
            version: state.version.clone(),
            elapsed: invoked_at.elapsed(),
        });
        let container_id = created.map_err(|e| e.context("container cannot be created"))?;

        debug!(
            run_id = %state.run_id,
            image = %spec.image,
            container_id = %container_id,
            elapsed_ms = invoked_at.elapsed().as_millis() as u64,
            "container has been created"
        );

        state.set_container_id(container_id.clone())?;
        let armed = on_created(&container_id);

        let created_at = Instant::now();
        let started = cancellable(cancel, self.runtime.start_container(&container_id)).await;
        self.metrics.observe(Observation::StartContainer {
            ok: started.is_ok(),
            version: state.version.clone(),
            elapsed: created_at.elapsed(),
        });
        started.map_err(|e| e.context("container cannot be started"))?;

        debug!(
            run_id = %state.run_id,
            container_id = %container_id,
            elapsed_ms = created_at.elapsed().as_millis() as u64,
            "container has been started"
        );

        Ok(armed)
    }

    /// Force remove a container along with its volumes.
    ///
    /// Returns `Ok(false)` when the container was already gone. Callers log
    /// errors instead of failing their own flow.
    pub async fn force_remove_container(&self, id: &str) -> Result<bool> {
        let invoked_at = Instant::now();

        let result = match self.runtime.remove_container(id, true, true).await {
            Ok(()) => {
                debug!(container_id = %id, "container has been force removed");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!(container_id = %id, "container has already been removed");
                Ok(false)
            }
            Err(e) => Err(e.context("failed to remove container")),
        };

        self.metrics.observe(Observation::RemoveContainer {
            ok: result.is_ok(),
            elapsed: invoked_at.elapsed(),
        });

        result
    }
}

/// `custom-config<ext>` inside the server config directory
fn custom_config_target(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    format!("{}/custom-config{}", SERVER_CONFIG_DIR, ext)
}
