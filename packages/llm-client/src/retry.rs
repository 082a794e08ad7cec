//! Generic retry helper with exponential backoff.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::{LlmError, Result};

/// Retry an operation with exponential backoff.
///
/// The operation is attempted up to `max_attempts` times. Errors classified
/// as permanent by [`LlmError::is_retriable`] abort immediately. Backoff
/// doubles per attempt (2s, 4s, ...); rate-limit errors add jitter so
/// concurrent callers do not re-stampede the endpoint in lockstep.
pub async fn retry_with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < max_attempts => {
                let mut wait = Duration::from_secs(1 << attempt);
                if matches!(err, LlmError::RateLimited(_)) {
                    wait += jitter();
                }
                warn!(
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    error = %err,
                    "LLM call failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sub-second jitter derived from the wall clock.
fn jitter() -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos % 1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Network("reset".into()))
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
    async fn test_permanent_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::Api {
                    status: 401,
                    message: "bad key".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Timeout) }
        })
        .await;
        assert!(matches!(result, Err(LlmError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
