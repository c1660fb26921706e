//! Bounded retry with exponential backoff.
//!
//! Call sites pick their own [`RetryPolicy`] and retry predicate; there is no
//! global policy.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{GenerationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
}

impl BackoffPolicy {
    pub const fn exponential(base: Duration, floor: Duration, ceiling: Duration) -> Self {
        Self { base, floor, ceiling }
    }

    /// No waiting between attempts.
    pub const fn none() -> Self {
        Self { base: Duration::ZERO, floor: Duration::ZERO, ceiling: Duration::ZERO }
    }

    /// Delay to wait after the `attempt`-th (1-based) failure:
    /// `base * 2^(attempt-1)` clamped into `[floor, ceiling]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let scaled = self.base.checked_mul(factor).unwrap_or(self.ceiling);
        scaled.max(self.floor).min(self.ceiling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Image backend policy: 3 attempts, 2s base doubling, never less than 5s
    /// nor more than 60s between attempts.
    pub const fn image_default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::exponential(Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(60)),
        }
    }

    pub const fn text_default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(30)),
        }
    }

    pub const fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, backoff: BackoffPolicy::none() }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects, or
/// `policy.max_attempts` attempts have been made. The last error is returned.
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut, P>(policy: &RetryPolicy, label: &str, is_retryable: P, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&GenerationError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.backoff.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_is_clamped() {
        let policy = RetryPolicy::image_default().backoff;
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(32));
        assert_eq!(policy.delay_for(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[test]
    fn backoff_never_decreases() {
        let policy = RetryPolicy::image_default().backoff;
        for attempt in 1..20 {
            assert!(policy.delay_for(attempt) <= policy.delay_for(attempt + 1));
        }
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&RetryPolicy::immediate(3), "test", GenerationError::is_retryable, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::Transport("connection reset".into())) }
        })
        .await;
        assert!(matches!(result, Err(GenerationError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryPolicy::immediate(5), "test", GenerationError::is_retryable, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(GenerationError::EmptyGenerationResponse("no parts".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&RetryPolicy::immediate(3), "test", GenerationError::is_retryable, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::MalformedResponse("not json".into())) }
        })
        .await;
        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _ = retry(&RetryPolicy::immediate(0), "test", |_: &GenerationError| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(GenerationError::Transport("down".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
