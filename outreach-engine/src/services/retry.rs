//! Bounded retry with linear backoff for provider calls
//!
//! Wraps LLM generation and email sends. Only transient failures (timeouts,
//! connection errors, 5xx responses) are retried; after `max_retries`
//! re-attempts the last error is returned.

use std::future::Future;
use std::time::Duration;

use outreach_common::Result;

/// Sleep multiplier per attempt: attempt n waits n * 300ms
const BACKOFF_STEP_MS: u64 = 300;

/// Retry a provider operation up to `max_retries` additional times.
///
/// The first call counts as attempt 1; attempt n is preceded (on failure)
/// by a sleep of `n * 300ms`.
pub async fn retry_request<F, Fut, T>(
    operation_name: &str,
    max_retries: u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Provider request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if attempt <= max_retries && err.is_retryable() => {
                let delay = Duration::from_millis(BACKOFF_STEP_MS * attempt as u64);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Provider request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Provider request failed, retries exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_request("test", 2, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Error::ProviderUnavailable("503".to_string()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_request("test", 2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ProviderUnavailable("503".to_string()))
        })
        .await;
        assert!(result.is_err());
        // 1 initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_request("test", 5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Provider("400 bad request".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
