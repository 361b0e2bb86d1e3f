//! Playground CLI - Main entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use playground_foundation::{load_json, InMemoryTagStorage, RunnerConfig, TracingMetrics};
use playground_runner::{ContainerRuntime, DockerRuntime, Runner};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Playground - run queries against any engine version in throwaway containers
#[derive(Parser, Debug)]
#[command(name = "playground")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Runner config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tag snapshot file: {"<version>": "<digest>"}
    #[arg(short, long)]
    tags: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single query
    Run {
        /// Engine version to run against
        #[arg(long = "engine-version", default_value = "latest")]
        engine_version: String,

        /// Query text
        #[arg(short, long)]
        query: String,

        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run the garbage collector until interrupted
    Gc,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    let tags = match &args.tags {
        Some(path) => {
            let map: HashMap<String, String> = load_json(path)?;
            InMemoryTagStorage::from_map(map)
        }
        None => InMemoryTagStorage::new(),
    };
    if tags.is_empty() {
        tracing::warn!("tag snapshot is empty; every version will be reported as not found");
    }

    let docker = DockerRuntime::connect_with_local_defaults()?;
    docker.ping().await.context("docker is not available")?;

    let lifetime = CancellationToken::new();
    let runner = Runner::new(
        lifetime.clone(),
        config,
        Arc::new(docker),
        Arc::new(tags),
        Arc::new(TracingMetrics),
    );

    match args.command {
        Command::Run {
            engine_version,
            query,
            run_id,
        } => {
            let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let cancel = lifetime.child_token();

            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let result = runner
                .run_query(&cancel, &run_id, &query, &engine_version)
                .await;
            runner.wait_for_cleanups().await;

            let output = result.with_context(|| format!("run {} failed", run_id))?;
            println!("{}", output);
        }
        Command::Gc => {
            let Some(handle) = runner.start_garbage_collector() else {
                anyhow::bail!("gc is not configured; add a \"gc\" section to the config file");
            };

            tokio::signal::ctrl_c().await?;
            lifetime.cancel();
            handle.await?;
        }
    }

    Ok(())
}
