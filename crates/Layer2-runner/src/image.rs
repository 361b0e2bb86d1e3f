//! Image cache / pull pipeline
//!
//! Resolves a version to its digest, derives the cache image name and pulls
//! plus retags only when that name is not present locally.

use crate::cancel::cancellable;
use crate::labels::{full_image_name, playground_image_name};
use crate::runtime::ContainerRuntime;
use crate::state::RequestState;
use playground_foundation::{Error, ImageTagStorage, MetricsSink, Observation, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Pulls engine images on cache miss
pub struct ImagePipeline {
    runtime: Arc<dyn ContainerRuntime>,
    tags: Arc<dyn ImageTagStorage>,
    metrics: Arc<dyn MetricsSink>,
    repository: String,
}

impl ImagePipeline {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        tags: Arc<dyn ImageTagStorage>,
        metrics: Arc<dyn MetricsSink>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            tags,
            metrics,
            repository: repository.into(),
        }
    }

    /// Make sure the image for `state.version` exists under its cache name.
    /// Sets `state`'s image name on success.
    pub async fn pull(&self, cancel: &CancellationToken, state: &mut RequestState) -> Result<()> {
        let started_at = Instant::now();

        let Some(tag) = self.tags.get(&state.version) else {
            self.metrics.observe(Observation::PullNewImage {
                ok: false,
                version: state.version.clone(),
                elapsed: started_at.elapsed(),
            });
            return Err(Error::VersionNotFound(state.version.clone()));
        };

        let image_name = playground_image_name(&self.repository, &tag.digest);
        state.set_image_name(image_name.clone());

        if self.image_exists(cancel, state, &image_name).await? {
            return Ok(());
        }

        let upstream = full_image_name(&self.repository, &state.version);
        let result = self.pull_and_tag(cancel, state, &upstream, &image_name).await;

        self.metrics.observe(Observation::PullNewImage {
            ok: result.is_ok(),
            version: state.version.clone(),
            elapsed: started_at.elapsed(),
        });

        if result.is_ok() {
            debug!(
                run_id = %state.run_id,
                image = %upstream,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "image has been pulled"
            );
        }

        result
    }

    async fn pull_and_tag(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
        upstream: &str,
        image_name: &str,
    ) -> Result<()> {
        cancellable(cancel, self.runtime.pull_image(upstream))
            .await
            .map_err(|e| e.context("docker pull failed"))?;

        debug!(image = %upstream, "base image has been pulled");

        cancellable(cancel, self.runtime.tag_image(upstream, image_name))
            .await
            .map_err(|e| {
                error!(
                    run_id = %state.run_id,
                    source = %upstream,
                    target = %image_name,
                    error = %e,
                    "failed to rename image"
                );
                e.context("failed to tag image")
            })
    }

    /// Probe the local cache. Lookup errors other than "not found" are logged
    /// and treated as a miss.
    async fn image_exists(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
        image_name: &str,
    ) -> Result<bool> {
        let started_at = Instant::now();

        match cancellable(cancel, self.runtime.inspect_image(image_name)).await {
            Ok(_) => {
                self.metrics.observe(Observation::PullExistedImage {
                    ok: true,
                    version: state.version.clone(),
                    elapsed: started_at.elapsed(),
                });
                debug!(
                    image = %image_name,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "image has already been pulled"
                );
                Ok(true)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => {
                self.metrics.observe(Observation::PullExistedImage {
                    ok: false,
                    version: state.version.clone(),
                    elapsed: started_at.elapsed(),
                });
                error!(image = %image_name, error = %e, "docker inspect failed");
                Ok(false)
            }
        }
    }
}
