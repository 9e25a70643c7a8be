use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ApiError, ApiResult, SERVER_UNREACHABLE};

/// Linear-backoff retry for network failures.
///
/// The first attempt runs immediately; before attempt `n + 1` the policy waits
/// `base_delay * n`. Only [`ApiError::Network`] is retried; any other error is
/// returned as-is. When every attempt fails the per-attempt errors are logged and
/// replaced by a single "server unreachable" error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(1_500) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_network() => return Err(e),
                Err(e) if attempt >= max => {
                    warn!(target: "panel_client::retry", attempt, max, "giving up: {}", e);
                    return Err(ApiError::network(SERVER_UNREACHABLE));
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(target: "panel_client::retry", attempt, max, delay_ms = delay.as_millis() as u64, "network failure, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Free-function form of [`RetryPolicy::run`].
pub async fn retry<T, F, Fut>(op: F, max_attempts: u32, base_delay: Duration) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    RetryPolicy::new(max_attempts, base_delay).run(op).await
}
