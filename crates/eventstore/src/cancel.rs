use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EventstoreError;

/// Run a storage call, aborting it on cancellation or after `timeout`.
///
/// The inner future is dropped when aborted. Event logs only make a push
/// visible once it has fully committed, so dropping never leaves a partial
/// write behind.
pub async fn cancellable<F, T>(
    token: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, EventstoreError>
where
    F: Future<Output = Result<T, EventstoreError>>,
{
    if token.is_cancelled() {
        return Err(EventstoreError::Cancelled);
    }

    let guarded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => res,
                Err(_) => {
                    debug!(?limit, "storage call timed out");
                    Err(EventstoreError::DeadlineExceeded(limit))
                }
            },
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("storage call cancelled");
            Err(EventstoreError::Cancelled)
        }
        res = guarded => res,
    }
}
