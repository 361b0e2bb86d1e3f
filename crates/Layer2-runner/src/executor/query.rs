//! Query executor
//!
//! There is no signal telling when the server inside a fresh container starts
//! accepting connections, so the query is simply sent again until the client
//! stops failing with "connection refused".

use crate::cancel::{cancellable, sleep};
use crate::runtime::{ContainerRuntime, OutputChunk};
use crate::state::RequestState;
use futures::StreamExt;
use playground_foundation::{Error, MetricsSink, Observation, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error text printed by the client while the server is still starting
pub const READINESS_SENTINEL: &str = "DB::NetException: Connection refused";

/// Captured output of one exec session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// stdout, followed by stderr on a new line when there is any
    pub fn combined(self) -> String {
        if self.stderr.is_empty() {
            self.stdout
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Whether the server accepted the query. Anything but the sentinel counts,
/// genuine query errors included.
pub fn is_ready(stderr: &str) -> bool {
    !stderr.contains(READINESS_SENTINEL)
}

/// Client invocation for a query
pub fn query_command(query: &str) -> Vec<String> {
    vec![
        "clickhouse-client".to_string(),
        "-n".to_string(),
        "-m".to_string(),
        "--query".to_string(),
        query.to_string(),
    ]
}

/// Runs queries with readiness retries
pub struct QueryExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<dyn MetricsSink>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl QueryExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            runtime,
            metrics,
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// At most `max_attempts` execs (at least one), `delay` apart
    pub fn with_retries(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Run the query once and collect its demultiplexed output.
    ///
    /// On cancellation this returns `Error::Cancelled` right away; the output
    /// collector keeps draining on its own and its result is dropped.
    pub async fn exec(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
    ) -> Result<ExecOutput> {
        let invoked_at = Instant::now();
        let result = self.exec_inner(cancel, state).await;

        self.metrics.observe(Observation::ExecCommand {
            ok: result.is_ok(),
            version: state.version.clone(),
            elapsed: invoked_at.elapsed(),
        });

        if result.is_ok() {
            debug!(
                run_id = %state.run_id,
                elapsed_ms = invoked_at.elapsed().as_millis() as u64,
                "exec finished"
            );
        }

        result
    }

    async fn exec_inner(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
    ) -> Result<ExecOutput> {
        let container_id = state.container_id()?;

        let mut stream = cancellable(
            cancel,
            self.runtime.exec(container_id, query_command(&state.query)),
        )
        .await?;

        let collector = tokio::spawn(async move {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    OutputChunk::Stdout(bytes) => stdout.extend_from_slice(&bytes),
                    OutputChunk::Stderr(bytes) => stderr.extend_from_slice(&bytes),
                }
            }
            Ok::<_, Error>(ExecOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        });

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            joined = collector => match joined {
                Ok(output) => output.map_err(|e| e.context("failed to get output")),
                Err(e) => Err(Error::Internal(format!("output collector failed: {}", e))),
            },
        }
    }

    /// Run the query, retrying while the server is not ready yet.
    ///
    /// Once attempts run out, the last output is returned as is.
    pub async fn run_query(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
    ) -> Result<String> {
        let invoked_at = Instant::now();
        let result = self.run_query_inner(cancel, state).await;

        self.metrics.observe(Observation::RunQuery {
            ok: result.is_ok(),
            version: state.version.clone(),
            elapsed: invoked_at.elapsed(),
        });

        result
    }

    async fn run_query_inner(
        &self,
        cancel: &CancellationToken,
        state: &RequestState,
    ) -> Result<String> {
        let mut output = ExecOutput::default();

        for attempt in 1..=self.max_attempts {
            output = self.exec(cancel, state).await?;

            if is_ready(&output.stderr) {
                debug!(run_id = %state.run_id, attempt, "query has been executed");
                break;
            }

            if attempt < self.max_attempts {
                sleep(cancel, self.retry_delay).await?;
            }
        }

        Ok(output.combined())
    }
}
