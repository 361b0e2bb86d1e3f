//! Docker runtime - bollard 기반 ContainerRuntime 구현

use super::{
    ContainerRuntime, ContainerSpec, ImageDetails, OutputChunk, OutputStream, PruneReport,
    RuntimeContainer, RuntimeImage,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, PruneContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions, TagImageOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use playground_foundation::{Error, Result};
use std::collections::HashMap;
use tracing::trace;

/// Container runtime backed by the Docker engine API
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using `DOCKER_HOST` or the platform default socket
    pub fn connect_with_local_defaults() -> Result<Self> {
        Docker::connect_with_local_defaults()
            .map(Self::new)
            .map_err(|e| Error::runtime("docker connect", e))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| Error::runtime("docker ping", e))
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageDetails> {
        let inspect = self
            .docker
            .inspect_image(name)
            .await
            .map_err(|e| map_err("docker image inspect", name, e))?;

        let last_tag_time = inspect
            .metadata
            .and_then(|m| m.last_tag_time)
            .as_deref()
            .and_then(parse_timestamp);

        Ok(ImageDetails {
            id: inspect.id.unwrap_or_default(),
            repo_tags: inspect.repo_tags.unwrap_or_default(),
            size: non_negative(inspect.size),
            last_tag_time,
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let options = Some(CreateImageOptions {
            from_image: reference,
            ..Default::default()
        });

        // The pull is only complete once the whole progress stream has been read.
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| map_err("docker pull", reference, e))?;
            if let Some(status) = info.status {
                trace!(image = reference, status = %status, "pull progress");
            }
        }

        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_reference(target);
        self.docker
            .tag_image(source, Some(TagImageOptions { repo, tag }))
            .await
            .map_err(|e| map_err("docker tag", source, e))
    }

    async fn list_images(&self) -> Result<Vec<RuntimeImage>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::runtime("docker image list", e))?;

        Ok(images
            .into_iter()
            .map(|img| RuntimeImage {
                id: img.id,
                repo_tags: img.repo_tags,
            })
            .collect())
    }

    async fn remove_image(&self, name: &str, prune_children: bool) -> Result<()> {
        let options = RemoveImageOptions {
            force: false,
            noprune: !prune_children,
        };

        self.docker
            .remove_image(name, Some(options), None)
            .await
            .map(|_| ())
            .map_err(|e| map_err("docker image remove", name, e))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(m.source.to_string_lossy().into_owned()),
                target: Some(m.target.clone()),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                mounts: if mounts.is_empty() { None } else { Some(mounts) },
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| map_err("docker container create", &spec.image, e))?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_err("docker container start", id, e))
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<OutputStream> {
        let exec_options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, exec_options)
            .await
            .map_err(|e| map_err("exec create", container_id, e))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_err("exec attach", &exec.id, e))?;

        match started {
            StartExecResults::Attached { output, .. } => Ok(output
                .filter_map(|item| async move {
                    match item {
                        Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                            Some(Ok(OutputChunk::Stdout(message.to_vec())))
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            Some(Ok(OutputChunk::Stderr(message.to_vec())))
                        }
                        Ok(LogOutput::StdIn { .. }) => None,
                        Err(e) => Some(Err(Error::runtime("exec output", e))),
                    }
                })
                .boxed()),
            StartExecResults::Detached => Err(Error::runtime(
                "exec attach",
                "exec session started detached",
            )),
        }
    }

    async fn remove_container(&self, id: &str, force: bool, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_err("docker container remove", id, e))
    }

    async fn prune_containers(&self, label: &str) -> Result<PruneReport> {
        let filters = HashMap::from([("label", vec![label])]);

        let report = self
            .docker
            .prune_containers(Some(PruneContainersOptions { filters }))
            .await
            .map_err(|e| Error::runtime("docker container prune", e))?;

        Ok(PruneReport {
            containers_deleted: report.containers_deleted.unwrap_or_default(),
            space_reclaimed: non_negative(report.space_reclaimed),
        })
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<RuntimeContainer>> {
        let filters = HashMap::from([("label", vec![label])]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                size: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::runtime("docker container list", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                Some(RuntimeContainer {
                    id,
                    created: created_at(c.created),
                    labels: c.labels.unwrap_or_default(),
                    size_rw: non_negative(c.size_rw),
                })
            })
            .collect())
    }
}

fn map_err(op: &str, object: &str, err: BollardError) -> Error {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::RuntimeNotFound(object.to_string()),
        other => Error::runtime(op, other),
    }
}

fn non_negative(value: Option<i64>) -> u64 {
    value.unwrap_or_default().max(0) as u64
}

/// Engine reports creation as unix seconds; zero or missing means unknown
fn created_at(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|&s| s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Split `repo:tag` into its parts. A colon before the last `/` belongs to a
/// registry port, not a tag.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(
            split_reference("chp-clickhouse/clickhouse-server:abc"),
            ("chp-clickhouse/clickhouse-server", "abc")
        );
        assert_eq!(
            split_reference("localhost:5000/clickhouse"),
            ("localhost:5000/clickhouse", "latest")
        );
        assert_eq!(
            split_reference("localhost:5000/clickhouse:22.1"),
            ("localhost:5000/clickhouse", "22.1")
        );
    }

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp("2022-01-02T03:04:05.123456789Z").unwrap();
        assert_eq!(parsed.timestamp(), 1641092645);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_created_at() {
        assert_eq!(created_at(Some(1641092645)).unwrap().timestamp(), 1641092645);
        assert!(created_at(None).is_none());
        assert!(created_at(Some(0)).is_none());
    }

    #[test]
    fn test_not_found_mapping() {
        let err = map_err(
            "docker image inspect",
            "chp-repo:abc",
            BollardError::DockerResponseServerError {
                status_code: 404,
                message: "No such image".to_string(),
            },
        );
        assert!(err.is_not_found());

        let err = map_err(
            "docker image inspect",
            "chp-repo:abc",
            BollardError::DockerResponseServerError {
                status_code: 500,
                message: "boom".to_string(),
            },
        );
        assert!(!err.is_not_found());
    }
}
