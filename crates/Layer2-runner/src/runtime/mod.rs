//! Container runtime abstraction
//!
//! Everything the runner and the garbage collector do against the engine goes
//! through [`ContainerRuntime`]. The handle is injected at construction and
//! shared by all request tasks and the collector; no extra locking is layered
//! on top of it.

mod docker;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use playground_foundation::Result;
use std::collections::HashMap;
use std::path::PathBuf;

/// Demultiplexed exec output
pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;

/// One frame of exec output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Image summary as returned by an image listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeImage {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// Inspected image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetails {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: u64,
    /// `None` when the engine never recorded a tag time
    pub last_tag_time: Option<DateTime<Utc>>,
}

/// Container summary as returned by a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContainer {
    pub id: String,
    /// `None` when the engine did not report a creation time
    pub created: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    /// Size of the writable layer in bytes
    pub size_rw: u64,
}

/// Bind mount from the host into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// What to create
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<BindMount>,
}

/// Result of a container prune
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub containers_deleted: Vec<String>,
    pub space_reclaimed: u64,
}

/// Container engine API used by the runner.
///
/// A missing object is reported as [`playground_foundation::Error::RuntimeNotFound`];
/// every other failure as [`playground_foundation::Error::Runtime`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the engine answers
    async fn ping(&self) -> Result<()>;

    async fn inspect_image(&self, name: &str) -> Result<ImageDetails>;

    /// Pull an image. Returns only once the engine's progress stream is drained.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Add `target` (`repo:tag`) as a tag of `source`
    async fn tag_image(&self, source: &str, target: &str) -> Result<()>;

    async fn list_images(&self) -> Result<Vec<RuntimeImage>>;

    /// Remove an image reference
    async fn remove_image(&self, name: &str, prune_children: bool) -> Result<()>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Create an exec session running `cmd` and attach to its output
    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<OutputStream>;

    async fn remove_container(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()>;

    /// Prune stopped containers carrying `label`
    async fn prune_containers(&self, label: &str) -> Result<PruneReport>;

    /// List all containers carrying `label`, running ones included, with sizes
    async fn list_containers(&self, label: &str) -> Result<Vec<RuntimeContainer>>;
}
