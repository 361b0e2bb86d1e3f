//! In-memory ContainerRuntime fake that records every call

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use playground_foundation::{
    Error, ImageTag, InMemoryTagStorage, MetricsSink, Observation, Result,
};
use playground_runner::{
    ContainerRuntime, ContainerSpec, ImageDetails, OutputChunk, OutputStream, PruneReport,
    RuntimeContainer, RuntimeImage,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const REPO: &str = "clickhouse/clickhouse-server";

/// What the next exec call does
#[derive(Debug, Clone)]
pub enum ExecScript {
    Output { stdout: String, stderr: String },
    /// Attach succeeds but output never arrives
    Hang,
    Fail,
}

impl ExecScript {
    pub fn ok(stdout: &str) -> Self {
        Self::Output {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn stderr(stderr: &str) -> Self {
        Self::Output {
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn not_ready() -> Self {
        Self::stderr("Code: 210. DB::NetException: Connection refused (localhost:9000)")
    }
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub inspected: Vec<String>,
    pub pulls: Vec<String>,
    pub tags: Vec<(String, String)>,
    pub image_lists: usize,
    pub removed_images: Vec<String>,
    pub created: Vec<ContainerSpec>,
    pub started: Vec<String>,
    pub execs: Vec<(String, Vec<String>)>,
    pub removed_containers: Vec<String>,
    pub prunes: Vec<String>,
    pub container_lists: Vec<String>,
}

#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Calls>,
    images: Mutex<Vec<ImageDetails>>,
    containers: Mutex<Vec<RuntimeContainer>>,
    exec_script: Mutex<VecDeque<ExecScript>>,
    prune_report: Mutex<PruneReport>,
    failing_tags: Mutex<HashSet<String>>,
    failing_inspects: Mutex<HashSet<String>>,
    fail_pull: AtomicBool,
    hang_pull: AtomicBool,
    hang_start: AtomicBool,
    fail_list_images: AtomicBool,
    fail_start: AtomicBool,
    fail_prune: AtomicBool,
    next_container: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn add_image(&self, image: ImageDetails) {
        self.images.lock().unwrap().push(image);
    }

    pub fn add_container(&self, container: RuntimeContainer) {
        self.containers.lock().unwrap().push(container);
    }

    pub fn script_exec(&self, scripts: impl IntoIterator<Item = ExecScript>) {
        self.exec_script.lock().unwrap().extend(scripts);
    }

    pub fn set_prune_report(&self, report: PruneReport) {
        *self.prune_report.lock().unwrap() = report;
    }

    pub fn fail_tag_removal(&self, tag: &str) {
        self.failing_tags.lock().unwrap().insert(tag.to_string());
    }

    pub fn fail_inspect(&self, id: &str) {
        self.failing_inspects.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_list_images(&self) {
        self.fail_list_images.store(true, Ordering::SeqCst);
    }

    /// Pulls are recorded, then never complete
    pub fn hang_pull(&self) {
        self.hang_pull.store(true, Ordering::SeqCst);
    }

    /// Starts are recorded, then never complete
    pub fn hang_start(&self) {
        self.hang_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_pull(&self) {
        self.fail_pull.store(true, Ordering::SeqCst);
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_prune(&self) {
        self.fail_prune.store(true, Ordering::SeqCst);
    }

    /// Wait until `n` container removals were requested (or give up after ~2s)
    pub async fn wait_for_removals(&self, n: usize) -> usize {
        for _ in 0..200 {
            let count = self.calls().removed_containers.len();
            if count >= n {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls().removed_containers.len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageDetails> {
        self.calls.lock().unwrap().inspected.push(name.to_string());
        if self.failing_inspects.lock().unwrap().contains(name) {
            return Err(Error::runtime("docker image inspect", "i/o timeout"));
        }
        self.images
            .lock()
            .unwrap()
            .iter()
            .find(|img| img.id == name || img.repo_tags.iter().any(|t| t == name))
            .cloned()
            .ok_or_else(|| Error::RuntimeNotFound(name.to_string()))
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        self.calls.lock().unwrap().pulls.push(reference.to_string());
        if self.hang_pull.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(Error::runtime("docker pull", "manifest unknown"));
        }

        let mut images = self.images.lock().unwrap();
        if !images.iter().any(|img| img.repo_tags.iter().any(|t| t == reference)) {
            images.push(ImageDetails {
                id: format!("id-{}", reference),
                repo_tags: vec![reference.to_string()],
                size: 1024,
                last_tag_time: None,
            });
        }
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .tags
            .push((source.to_string(), target.to_string()));

        let mut images = self.images.lock().unwrap();
        let image = images
            .iter_mut()
            .find(|img| img.repo_tags.iter().any(|t| t == source))
            .ok_or_else(|| Error::RuntimeNotFound(source.to_string()))?;
        image.repo_tags.push(target.to_string());
        image.last_tag_time = Some(Utc::now());
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<RuntimeImage>> {
        self.calls.lock().unwrap().image_lists += 1;
        if self.fail_list_images.load(Ordering::SeqCst) {
            return Err(Error::runtime("docker image list", "daemon is busy"));
        }
        Ok(self
            .images
            .lock()
            .unwrap()
            .iter()
            .map(|img| RuntimeImage {
                id: img.id.clone(),
                repo_tags: img.repo_tags.clone(),
            })
            .collect())
    }

    async fn remove_image(&self, name: &str, _prune_children: bool) -> Result<()> {
        self.calls.lock().unwrap().removed_images.push(name.to_string());
        if self.failing_tags.lock().unwrap().contains(name) {
            return Err(Error::runtime("docker image remove", "conflict"));
        }

        let mut images = self.images.lock().unwrap();
        for img in images.iter_mut() {
            img.repo_tags.retain(|t| t != name);
        }
        images.retain(|img| !img.repo_tags.is_empty());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.calls.lock().unwrap().created.push(spec.clone());
        let n = self.next_container.fetch_add(1, Ordering::SeqCst);
        Ok(format!("container-{}", n))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.calls.lock().unwrap().started.push(id.to_string());
        if self.hang_start.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::runtime(
                "docker container start",
                "port is already allocated",
            ));
        }
        Ok(())
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<OutputStream> {
        self.calls
            .lock()
            .unwrap()
            .execs
            .push((container_id.to_string(), cmd));

        let script = self
            .exec_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecScript::ok(""));

        match script {
            ExecScript::Output { stdout, stderr } => Ok(stream::iter(vec![
                Ok(OutputChunk::Stdout(stdout.into_bytes())),
                Ok(OutputChunk::Stderr(stderr.into_bytes())),
            ])
            .boxed()),
            ExecScript::Hang => Ok(stream::pending::<Result<OutputChunk>>().boxed()),
            ExecScript::Fail => Err(Error::runtime("exec create", "container is not running")),
        }
    }

    async fn remove_container(&self, id: &str, _force: bool, _remove_volumes: bool) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let seen = calls.removed_containers.iter().any(|c| c == id);
        calls.removed_containers.push(id.to_string());
        if seen {
            return Err(Error::RuntimeNotFound(id.to_string()));
        }
        drop(calls);

        self.containers.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn prune_containers(&self, label: &str) -> Result<PruneReport> {
        self.calls.lock().unwrap().prunes.push(label.to_string());
        if self.fail_prune.load(Ordering::SeqCst) {
            return Err(Error::runtime("docker container prune", "daemon is busy"));
        }
        Ok(self.prune_report.lock().unwrap().clone())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<RuntimeContainer>> {
        self.calls.lock().unwrap().container_lists.push(label.to_string());
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.labels.contains_key(label))
            .cloned()
            .collect())
    }
}

/// Metrics sink that keeps every observation
#[derive(Default)]
pub struct RecordingMetrics {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<Observation> {
        self.all().into_iter().filter(|o| o.name() == name).collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn observe(&self, observation: Observation) {
        self.observations.lock().unwrap().push(observation);
    }
}

/// `latest` and `22.1` share a digest, `21.8` has its own
pub fn tag_storage() -> Arc<InMemoryTagStorage> {
    let storage = InMemoryTagStorage::new();
    storage.replace_all(vec![
        ImageTag::new("latest", "sha256:abc"),
        ImageTag::new("22.1", "sha256:abc"),
        ImageTag::new("21.8", "sha256:def"),
    ]);
    Arc::new(storage)
}

pub fn cached_image(id: &str, hex: &str, tagged_at: DateTime<Utc>) -> ImageDetails {
    ImageDetails {
        id: id.to_string(),
        repo_tags: vec![playground_runner::playground_image_name(REPO, hex)],
        size: 1000,
        last_tag_time: Some(tagged_at),
    }
}
