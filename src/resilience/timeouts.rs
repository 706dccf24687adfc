//! Deadline enforcement for slow external calls.
//!
//! Every loader call made by the router goes through [`with_deadline`], so a
//! hung backend turns into an error instead of an indefinitely pending task.

use std::future::Future;
use std::time::Duration;

/// Run `fut`, mapping expiry of `limit` to the error built by `on_timeout`.
pub async fn with_deadline<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
