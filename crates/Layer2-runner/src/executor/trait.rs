//! QueryRunner trait

use async_trait::async_trait;
use playground_foundation::Result;
use tokio_util::sync::CancellationToken;

/// Runner trait - implement to add new query backends
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run `query` against engine `version` and return its output
    async fn run_query(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        query: &str,
        version: &str,
    ) -> Result<String>;

    /// Get runner name
    fn name(&self) -> &'static str;
}
