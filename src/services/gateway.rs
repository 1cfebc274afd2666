use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;

/// Backoff delays are capped regardless of attempt count.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Bounded-retry configuration shared by all capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total upstream attempts per invocation, first try included.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): exponential in
    /// the attempt number with multiplicative jitter in [0.5, 1.5).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        let exp = self.base_backoff.saturating_mul(1 << shift);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        exp.mul_f64(jitter).min(MAX_BACKOFF)
    }
}

/// Uniform calling convention for the three upstream capabilities.
///
/// Wraps every provider call with a per-attempt timeout, bounded retries with
/// exponential backoff and jitter, cancellation, and normalized `ModelError`
/// classification. Pipelines go through `invoke` and never retry on top of it.
pub struct ModelGateway {
    retry: RetryPolicy,
}

impl ModelGateway {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Runs `attempt_fn` until it succeeds, fails terminally, or the attempt
    /// budget is spent.
    ///
    /// Each attempt runs under `timeout`; a timeout is classified retryable.
    /// A `RateLimited` error with a server-provided hint sleeps for the hint
    /// instead of the computed backoff. Cancellation aborts both the
    /// in-flight attempt and any backoff sleep.
    pub async fn invoke<T, F, Fut>(
        &self,
        capability: &'static str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }

            let started = tokio::time::Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                res = tokio::time::timeout(timeout, attempt_fn()) => res,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let err = match outcome {
                Ok(Ok(value)) => {
                    tracing::debug!(capability, attempt, latency_ms, "upstream call succeeded");
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => ModelError::Retryable(format!(
                    "{capability} timed out after {}ms",
                    timeout.as_millis()
                )),
            };

            if !err.is_retryable() || attempt >= self.retry.max_attempts {
                tracing::warn!(
                    capability,
                    attempt,
                    latency_ms,
                    kind = err.kind(),
                    error = %err,
                    "upstream call failed"
                );
                return Err(err);
            }

            let delay = match &err {
                ModelError::RateLimited {
                    retry_after: Some(hint),
                    ..
                } => *hint,
                _ => self.retry.delay_for_attempt(attempt),
            };
            tracing::warn!(
                capability,
                attempt,
                latency_ms,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying upstream call"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn gateway(max_attempts: u32) -> ModelGateway {
        ModelGateway::new(RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(100),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_success_first_attempt() {
        let gw = gateway(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ModelError>(42u32) }
            })
            .await;

        assert_eq!(assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_retries_transient_failures() {
        let gw = gateway(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ModelError::Retryable("flaky".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_exhausts_attempt_budget() {
        let gw = gateway(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ModelError::Retryable("down".to_string())) }
            })
            .await;

        assert_err!(&result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_does_not_retry_terminal_errors() {
        let gw = gateway(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ModelError::NonRetryable("bad key".to_string())) }
            })
            .await;

        match result {
            Err(ModelError::NonRetryable(_)) => {}
            other => panic!("expected NonRetryable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_classifies_timeout_as_retryable() {
        let gw = gateway(2);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_millis(50), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    std::future::pending::<()>().await;
                    Ok::<u32, ModelError>(0)
                }
            })
            .await;

        match result {
            Err(ModelError::Retryable(reason)) => assert!(reason.contains("timed out")),
            other => panic!("expected Retryable timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_honors_rate_limit_hint() {
        let gw = gateway(2);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ModelError::RateLimited {
                            reason: "slow down".to_string(),
                            retry_after: Some(Duration::from_secs(60)),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_respects_pre_cancelled_token() {
        let gw = gateway(3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result = gw
            .invoke("test", Duration::from_secs(1), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<u32, ModelError>(0) }
            })
            .await;

        match result {
            Err(ModelError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(200),
        };
        // Jitter is in [0.5, 1.5), so bounds are deterministic per attempt.
        let first = policy.delay_for_attempt(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first < Duration::from_millis(300));

        let third = policy.delay_for_attempt(3);
        assert!(third >= Duration::from_millis(400));
        assert!(third < Duration::from_millis(1200));

        let huge = policy.delay_for_attempt(1000);
        assert!(huge <= MAX_BACKOFF);
    }
}
