//! Per-request state

use playground_foundation::{Error, Result};

/// Transient record owned by one in-flight query
#[derive(Debug, Clone)]
pub struct RequestState {
    pub run_id: String,
    pub version: String,
    pub query: String,
    image_name: Option<String>,
    container_id: Option<String>,
}

impl RequestState {
    pub fn new(
        run_id: impl Into<String>,
        query: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            version: version.into(),
            query: query.into(),
            image_name: None,
            container_id: None,
        }
    }

    /// Cached image name, set by the pull step
    pub fn image_name(&self) -> Result<&str> {
        self.image_name
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("run {}: image is not pulled", self.run_id)))
    }

    pub fn set_image_name(&mut self, name: impl Into<String>) {
        self.image_name = Some(name.into());
    }

    /// Container id, set once the container is created
    pub fn container_id(&self) -> Result<&str> {
        self.container_id.as_deref().ok_or_else(|| {
            Error::Internal(format!("run {}: container is not created", self.run_id))
        })
    }

    pub fn has_container(&self) -> bool {
        self.container_id.is_some()
    }

    /// Assign the container id. A request owns at most one container.
    pub fn set_container_id(&mut self, id: impl Into<String>) -> Result<()> {
        if let Some(existing) = &self.container_id {
            return Err(Error::Internal(format!(
                "run {}: container {} is already assigned",
                self.run_id, existing
            )));
        }
        self.container_id = Some(id.into());
        Ok(())
    }
}
