//! Cancellation helpers

use playground_foundation::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first
pub(crate) async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Sleep that wakes up early with `Error::Cancelled`
pub(crate) async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
