//! Runner - composes pull, container lifecycle and query execution per request

use crate::container::ContainerManager;
use crate::executor::{QueryExecutor, QueryRunner};
use crate::gc::GarbageCollector;
use crate::image::ImagePipeline;
use crate::runtime::ContainerRuntime;
use crate::state::RequestState;
use async_trait::async_trait;
use playground_foundation::{ImageTagStorage, MetricsSink, Result, RunnerConfig};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Executes queries in containers created through the local engine API
pub struct Runner {
    config: RunnerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<dyn MetricsSink>,
    images: ImagePipeline,
    containers: Arc<ContainerManager>,
    executor: QueryExecutor,
    /// In-flight cleanup watchers
    cleanups: TaskTracker,
    /// Runner lifetime; stops the garbage collector
    lifetime: CancellationToken,
}

impl Runner {
    pub fn new(
        lifetime: CancellationToken,
        config: RunnerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        tags: Arc<dyn ImageTagStorage>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let images = ImagePipeline::new(
            Arc::clone(&runtime),
            tags,
            Arc::clone(&metrics),
            config.repository.clone(),
        );

        let mut containers = ContainerManager::new(Arc::clone(&runtime), Arc::clone(&metrics));
        if let Some(path) = &config.custom_config_path {
            containers = containers.with_custom_config(path);
        }

        let executor = QueryExecutor::new(Arc::clone(&runtime), Arc::clone(&metrics))
            .with_retries(config.exec_attempts(), config.exec_retry_delay());

        Self {
            config,
            runtime,
            metrics,
            images,
            containers: Arc::new(containers),
            executor,
            cleanups: TaskTracker::new(),
            lifetime,
        }
    }

    /// Spawn the garbage collector on the current runtime.
    ///
    /// Returns `None` when no GC config is present. The loop ends once the
    /// runner's lifetime token is cancelled.
    pub fn start_garbage_collector(&self) -> Option<JoinHandle<()>> {
        let Some(gc) = self.garbage_collector() else {
            info!("gc is disabled due to a missed configuration");
            return None;
        };

        Some(tokio::spawn(gc.run()))
    }

    /// Collector sharing this runner's runtime handle, if GC is configured
    pub fn garbage_collector(&self) -> Option<GarbageCollector> {
        let config = self.config.gc.clone()?;

        Some(GarbageCollector::new(
            self.lifetime.clone(),
            config,
            Arc::clone(&self.runtime),
            Arc::clone(&self.containers),
            Arc::clone(&self.metrics),
            self.config.repository.clone(),
        ))
    }

    /// Wait until every spawned cleanup watcher has removed its container.
    /// Queries started afterwards are still cleaned up but no longer awaited.
    pub async fn wait_for_cleanups(&self) {
        self.cleanups.close();
        self.cleanups.wait().await;
    }

    /// Pull, start a container, run the query, and always remove the container.
    pub async fn run_query(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        query: &str,
        version: &str,
    ) -> Result<String> {
        let mut state = RequestState::new(run_id, query, version);

        self.images
            .pull(cancel, &mut state)
            .await
            .map_err(|e| e.context("pull failed"))?;

        // The watcher is armed right after creation so that a failed or
        // abandoned start is cleaned up too.
        let _cleanup = self
            .containers
            .run_container(cancel, &mut state, |container_id| {
                self.spawn_cleanup_watcher(cancel.clone(), run_id, container_id.to_string())
            })
            .await
            .map_err(|e| e.context("failed to run container"))?;

        self.executor
            .run_query(cancel, &state)
            .await
            .map_err(|e| e.context("failed to run query"))
    }

    /// Remove the container once the request is cancelled or the returned
    /// guard is dropped, whichever comes first. Runs exactly once.
    fn spawn_cleanup_watcher(
        &self,
        cancel: CancellationToken,
        run_id: &str,
        container_id: String,
    ) -> CleanupGuard {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let containers = Arc::clone(&self.containers);
        let run_id = run_id.to_string();

        self.cleanups.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = done_rx => {}
            }

            if let Err(err) = containers.force_remove_container(&container_id).await {
                error!(run_id = %run_id, error = %err, "failed to kill container");
            }
        });

        CleanupGuard { _done: done_tx }
    }
}

#[async_trait]
impl QueryRunner for Runner {
    async fn run_query(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        query: &str,
        version: &str,
    ) -> Result<String> {
        Runner::run_query(self, cancel, run_id, query, version).await
    }

    fn name(&self) -> &'static str {
        "localdocker"
    }
}

/// Dropping this signals the cleanup watcher that the request is over.
struct CleanupGuard {
    _done: oneshot::Sender<()>,
}
