//! Garbage collector
//!
//! Periodically prunes stopped containers, force removes containers that
//! outlived their TTL, and evicts least recently tagged cache images once
//! there are too many of them. Runs unsynchronized with request traffic and
//! only touches resources carrying the ownership label or the cache naming
//! convention.

use crate::container::ContainerManager;
use crate::labels::{is_playground_image_name, LABEL_OWNERSHIP, LABEL_RUN_ID};
use crate::runtime::{ContainerRuntime, ImageDetails};
use chrono::{DateTime, Utc};
use playground_foundation::{Error, GcConfig, MetricsSink, Observation, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Outcome of one sub-pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub count: u64,
    pub space_reclaimed: u64,
}

/// Background reclamation of containers and cached images
pub struct GarbageCollector {
    lifetime: CancellationToken,
    config: GcConfig,
    runtime: Arc<dyn ContainerRuntime>,
    containers: Arc<ContainerManager>,
    metrics: Arc<dyn MetricsSink>,
    repository: String,
}

impl GarbageCollector {
    pub fn new(
        lifetime: CancellationToken,
        config: GcConfig,
        runtime: Arc<dyn ContainerRuntime>,
        containers: Arc<ContainerManager>,
        metrics: Arc<dyn MetricsSink>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            lifetime,
            config,
            runtime,
            containers,
            metrics,
            repository: repository.into(),
        }
    }

    fn is_stopped(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Trigger once right away, then on every tick until the lifetime token is cancelled.
    pub async fn run(self) {
        let frequency = self.config.trigger_frequency();
        info!(
            trigger_frequency_secs = frequency.as_secs(),
            "gc has been started"
        );

        let mut timer = tokio::time::interval(frequency);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.lifetime.cancelled() => break,
                _ = timer.tick() => {}
            }

            if let Err(err) = self.trigger().await {
                error!(error = %err, "gc trigger failed");
            }
        }

        info!("gc has been finished");
    }

    /// One GC pass: containers, then images. A failed container pass skips
    /// the image pass for this trigger.
    pub async fn trigger(&self) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }

        self.collect_containers()
            .await
            .map_err(|e| Error::Gc(format!("containers gc failed: {}", e)))?;

        if self.is_stopped() {
            return Ok(());
        }

        self.collect_images()
            .await
            .map_err(|e| Error::Gc(format!("images gc failed: {}", e)))?;

        debug!("gc finished");
        Ok(())
    }

    /// Prune exited containers and force remove ones older than the TTL.
    pub async fn collect_containers(&self) -> Result<CollectStats> {
        let started_at = Instant::now();
        let mut stats = CollectStats::default();

        let result = self.collect_containers_into(&mut stats).await;

        self.metrics.observe(Observation::ContainersCollected {
            count: stats.count,
            space_reclaimed: stats.space_reclaimed,
            elapsed: started_at.elapsed(),
        });

        result.map(|_| stats)
    }

    async fn collect_containers_into(&self, stats: &mut CollectStats) -> Result<()> {
        let pruned = self
            .runtime
            .prune_containers(LABEL_OWNERSHIP)
            .await
            .map_err(|e| e.context("failed to prune stopped containers"))?;

        stats.count += pruned.containers_deleted.len() as u64;
        stats.space_reclaimed += pruned.space_reclaimed;

        let Some(ttl) = self.config.container_ttl() else {
            return Ok(());
        };
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Config(format!("container ttl is out of range: {}", e)))?;

        // Containers the request cleanup failed to remove (crash, leaked task).
        let containers = self
            .runtime
            .list_containers(LABEL_OWNERSHIP)
            .await
            .map_err(|e| e.context("failed to list containers"))?;

        let now = Utc::now();
        for container in containers {
            if !is_expired(container.created, ttl, now) {
                continue;
            }

            let run_id = container.labels.get(LABEL_RUN_ID).map(String::as_str);
            match self.containers.force_remove_container(&container.id).await {
                Ok(true) => {
                    debug!(
                        container_id = %container.id,
                        run_id = run_id.unwrap_or("-"),
                        "expired container has been removed"
                    );
                    stats.count += 1;
                    stats.space_reclaimed += container.size_rw;
                }
                Ok(false) => {}
                Err(err) => {
                    error!(
                        container_id = %container.id,
                        run_id = run_id.unwrap_or("-"),
                        error = %err,
                        "containers gc failed to remove container"
                    );
                }
            }
        }

        Ok(())
    }

    /// Keep the `image_buffer_size` most recently tagged cache images and
    /// remove the rest, once there are at least `image_gc_count_threshold` of them.
    pub async fn collect_images(&self) -> Result<CollectStats> {
        let Some(threshold) = self.config.image_gc_count_threshold else {
            return Ok(CollectStats::default());
        };

        let started_at = Instant::now();
        let mut stats = CollectStats::default();

        let result = self.collect_images_into(threshold as usize, &mut stats).await;

        self.metrics.observe(Observation::ImagesCollected {
            count: stats.count,
            space_reclaimed: stats.space_reclaimed,
            elapsed: started_at.elapsed(),
        });

        result.map(|_| stats)
    }

    async fn collect_images_into(
        &self,
        threshold: usize,
        stats: &mut CollectStats,
    ) -> Result<()> {
        let images = self
            .runtime
            .list_images()
            .await
            .map_err(|e| e.context("failed to list images"))?;

        let candidates: Vec<_> = images
            .into_iter()
            .filter(|img| {
                img.repo_tags
                    .iter()
                    .any(|tag| is_playground_image_name(tag, &self.repository))
            })
            .collect();

        if candidates.len() < threshold {
            return Ok(());
        }

        let mut detailed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.runtime.inspect_image(&candidate.id).await {
                Ok(details) => detailed.push(details),
                Err(err) => {
                    error!(image_id = %candidate.id, error = %err, "docker image inspect failed");
                }
            }
        }

        let evicted = select_evictions(detailed, self.config.image_buffer_size as usize);
        *stats = self.remove_images(&evicted).await;

        Ok(())
    }

    /// An image only counts once every one of its tags is gone.
    async fn remove_images(&self, images: &[ImageDetails]) -> CollectStats {
        let mut stats = CollectStats::default();

        for img in images {
            let mut ok = true;
            for tag in &img.repo_tags {
                match self.runtime.remove_image(tag, true).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        error!(
                            image_id = %img.id,
                            tag = %tag,
                            error = %err,
                            "failed to delete image tag"
                        );
                        ok = false;
                    }
                }
            }

            if !ok {
                continue;
            }

            debug!(image_id = %img.id, tags = ?img.repo_tags, "image has been removed");
            stats.count += 1;
            stats.space_reclaimed += img.size;
        }

        stats
    }
}

/// Whether a container created at `created` has outlived `ttl`.
///
/// Containers without a creation time never expire, and neither do ones
/// whose expiry lies beyond the representable range.
fn is_expired(
    created: Option<DateTime<Utc>>,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> bool {
    created
        .and_then(|created| created.checked_add_signed(ttl))
        .is_some_and(|expires_at| expires_at <= now)
}

/// Sort oldest tagged first and return everything except the `buffer_size`
/// most recently tagged images.
pub fn select_evictions(mut images: Vec<ImageDetails>, buffer_size: usize) -> Vec<ImageDetails> {
    images.sort_by(|a, b| a.last_tag_time.cmp(&b.last_tag_time));
    let keep_from = images.len().saturating_sub(buffer_size);
    images.truncate(keep_from);
    images
}
