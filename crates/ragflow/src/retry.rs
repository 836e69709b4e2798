//! Bounded retry with exponential backoff and jitter

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// Base delay for the first retry
const BASE_DELAY_MS: u64 = 500;

/// Upper bound for a single backoff delay
const MAX_DELAY_MS: u64 = 10_000;

/// Retry an operation up to `max_retries` additional attempts.
///
/// Only transient errors are retried; fatal errors return immediately.
/// Delays grow exponentially from half a second and carry up to 50% random
/// jitter so parallel pipelines do not hammer a recovering service in
/// lockstep. The final transient error is surfaced unchanged once the budget
/// is exhausted.
pub async fn retry_with_backoff<F, Fut, T>(service: &'static str, max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    "{} request failed (attempt {}/{}), retrying in {:?}: {}",
                    service,
                    attempt + 1,
                    max_retries + 1,
                    delay,
                    e
                );
                last_error = Some(e);
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::transient(service, "retry budget exhausted")))
}

/// Exponential delay for the given attempt, with jitter
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt)).min(MAX_DELAY_MS);
    let jitter = rand::thread_rng().gen_range(0..=exp / 2);
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("test", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("test", "try again"))
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
    async fn test_fatal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::fatal("test", "bad auth")) }
        })
        .await;
        assert!(matches!(result, Err(Error::Fatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let result: Result<()> = retry_with_backoff("test", 1, || async {
            Err(Error::transient("test", "still down"))
        })
        .await;
        match result {
            Err(Error::Transient { message, .. }) => assert_eq!(message, "still down"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_backoff_delay_bounded() {
        for attempt in 0..10 {
            let d = backoff_delay(attempt);
            assert!(d.as_millis() as u64 <= MAX_DELAY_MS + MAX_DELAY_MS / 2);
        }
    }
}
