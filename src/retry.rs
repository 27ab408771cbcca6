use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{ApiError, ApiResult};

/// Fixed-delay, bounded-attempt retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero behaves like one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Runs `op` until it succeeds, fails with an error `retryable` rejects,
    /// or `max_attempts` attempts were made. The last error is returned.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if retryable(&err) && attempt < attempts => {
                    warn!("attempt {attempt}/{attempts} for {label} failed: {err}");
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if retryable(&err) {
                        error!("all {attempts} attempts exhausted for {label}: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// [`run`](Self::run) retrying only authorization and rate-limit failures.
    pub async fn run_api<T, F, Fut>(&self, label: &str, op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.run(label, ApiError::is_retryable, op).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn immediate(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn rate_limited_call_is_attempted_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ApiResult<()> = immediate(3)
            .run_api("always limited", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::RateLimited) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn generic_api_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ApiResult<()> = immediate(3)
            .run_api("server error", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ApiError::Api {
                        status: 500,
                        body: "oops".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Api { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = immediate(3)
            .run_api("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::Unauthorized)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), String> = immediate(0)
            .run("once", |_: &String| true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
