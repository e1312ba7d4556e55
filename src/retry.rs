//! Explicit retry policy with exponential backoff and jitter.
//!
//! One policy type serves every retried seam (download, remote encoder,
//! storage adapters) instead of ad-hoc loops at each call site. Rate-limit
//! errors carrying a server-advised delay override the backoff sequence for
//! that attempt.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay before retry number `retry` (0-based): base doubling each step,
    /// capped, with up to 25% additive jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.min(16);
        let raw = self.base_delay.saturating_mul(1u32 << exp);
        let capped = raw.min(self.max_delay);
        let jitter_budget = capped.as_millis() as u64 / 4;
        let jitter = if jitter_budget == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_budget)
        };
        capped + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the attempt
/// budget is exhausted. The last error is returned on exhaustion.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut last_err: Option<PipelineError> = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = match &last_err {
                Some(PipelineError::RateLimited {
                    retry_after: Some(advised),
                }) => *advised,
                _ => policy.delay_for(attempt - 1),
            };
            debug!(op = op_name, attempt, ?delay, "backing off before retry");
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(op = op_name, attempt, error = %e, "retryable failure");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| PipelineError::TransientNetwork(format!("{op_name}: no attempts made"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PipelineError::TransientNetwork("reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_retry(&fast_policy(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::ValidationFailed("bad magic".into())) }
        })
        .await;
        assert!(matches!(result, Err(PipelineError::ValidationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_retry(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::Storage("locked".into())) }
        })
        .await;
        assert!(matches!(result, Err(PipelineError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn honors_server_advised_delay() {
        // A 0ms advised delay keeps the test fast while exercising the branch.
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(2), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PipelineError::RateLimited {
                        retry_after: Some(Duration::from_millis(0)),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        // Jitter adds at most 25%, so compare against the floor.
        assert!(policy.delay_for(0) >= Duration::from_millis(100));
        assert!(policy.delay_for(1) >= Duration::from_millis(200));
        assert!(policy.delay_for(3) >= Duration::from_millis(400));
        assert!(policy.delay_for(3) <= Duration::from_millis(500));
    }
}
