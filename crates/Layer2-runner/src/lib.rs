//! # playground-runner
//!
//! Runs short-lived queries in throwaway containers on a local engine.
//!
//! ## Features
//!
//! - Image cache keyed by content digest, pulled only on cache miss
//! - Labeled container lifecycle with guaranteed per-request cleanup
//! - Readiness retries while the in-container server is starting
//! - **Background garbage collection of stale containers and cached images**

mod cancel;
pub mod container;
pub mod executor;
pub mod gc;
pub mod image;
pub mod labels;
pub mod runner;
pub mod runtime;
pub mod state;

pub use container::ContainerManager;
pub use executor::{is_ready, ExecOutput, QueryExecutor, QueryRunner, READINESS_SENTINEL};
pub use gc::{select_evictions, CollectStats, GarbageCollector};
pub use image::ImagePipeline;
pub use labels::{
    container_labels, full_image_name, is_playground_image_name, playground_image_name,
    LABEL_OWNERSHIP, LABEL_RUN_ID, LABEL_VERSION,
};
pub use runner::Runner;
pub use runtime::{
    BindMount, ContainerRuntime, ContainerSpec, DockerRuntime, ImageDetails, OutputChunk,
    OutputStream, PruneReport, RuntimeContainer, RuntimeImage,
};
pub use state::RequestState;
