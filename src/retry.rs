//! Exponential-backoff retry for index requests.
//!
//! Only errors for which [`IndexError::is_retryable`] holds are retried:
//! network failures, 5xx, and 429. Client errors surface immediately so the
//! caller can decide how to recover (see the sanitize-and-retry path in
//! [`crate::mutation`]).
//!
//! With the defaults the delays are 1s then 2s, three attempts in total.

use docindex_core::error::{IndexError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::transport::RawResponse;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff: config.backoff,
        }
    }

    /// Policy with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            backoff: 1.0,
        }
    }

    /// Delay before attempt `attempt` (1-based; attempt 1 has none).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff.powi(attempt as i32 - 2);
        self.initial_delay.mul_f64(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_when(label, IndexError::is_retryable, op).await
    }

    /// [`run`](Self::run) with the caller deciding which errors are worth
    /// another attempt.
    pub async fn run_when<T, P, F, Fut>(&self, label: &str, retryable: P, mut op: F) -> Result<T>
    where
        P: Fn(&IndexError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying index request"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like [`run`](Self::run) for requests whose status the caller
    /// interprets: retryable statuses are turned into errors and retried,
    /// every other status is returned as-is.
    pub async fn run_request<F, Fut>(&self, label: &str, mut op: F) -> Result<RawResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RawResponse>>,
    {
        let outcome = self
            .run(label, || {
                let fut = op();
                async move {
                    let resp = fut.await?;
                    let as_error = IndexError::Status {
                        status: resp.status,
                        body: String::new(),
                    };
                    if !resp.is_success() && as_error.is_retryable() {
                        Err(resp.into_error())
                    } else {
                        Ok(resp)
                    }
                }
            })
            .await;

        // A retryable status that outlived the budget goes back to the caller
        // as a response, like any other status.
        match outcome {
            Err(IndexError::Status { status, body }) => Ok(RawResponse { status, body }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IndexError::Transport("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::immediate(3)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IndexError::Status {
                    status: 503,
                    body: String::new(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::immediate(3)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IndexError::Status {
                    status: 400,
                    body: String::new(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_when_retries_what_the_caller_asks() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run_when("op", |_| true, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IndexError::Status {
                        status: 403,
                        body: String::new(),
                    })
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_request_returns_final_status() {
        let calls = AtomicU32::new(0);
        let resp = RetryPolicy::immediate(2)
            .run_request("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(RawResponse::new(500, "boom"))
            })
            .await
            .unwrap();
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let resp = RetryPolicy::immediate(3)
            .run_request("op", || async { Ok(RawResponse::new(404, "")) })
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
    }
}
