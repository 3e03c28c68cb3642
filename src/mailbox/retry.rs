//! Bounded retry for provider calls.
//!
//! `backoff::ExponentialBackoff` computes the jittered delay; the loop itself
//! is explicit so the attempt cap and the `Retry-After` floor stay visible.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::types::ProviderError;

/// Retry settings for provider calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Jitter as a fraction of the computed delay.
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            randomization_factor: 0.3,
        }
    }
}

/// Why a retried call gave up
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    /// The error is not worth retrying.
    #[error("{0}")]
    Permanent(ProviderError),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ProviderError },
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The delay before the next attempt is the jittered exponential delay,
    /// raised to the provider's `Retry-After` when that is longer. A
    /// `Retry-After` beyond `max_interval` ends the loop at once as
    /// [`RetryError::Exhausted`]; no sleep ever exceeds `max_interval`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut backoff = self.backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(RetryError::Permanent(err)),
                Err(err) => err,
            };

            if attempt >= self.max_attempts.max(1) {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let computed = backoff.next_backoff().unwrap_or(self.max_interval);
            let delay = match err.retry_after() {
                Some(floor) if floor > self.max_interval => {
                    warn!(
                        attempt,
                        retry_after_ms = floor.as_millis() as u64,
                        error = %err,
                        "Provider asked for a longer pause than allowed, giving up"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Some(floor) if floor > computed => floor,
                _ => computed,
            };
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            randomization_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = fast_policy(5)
            .run(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(ProviderError::Server { status: 503, retry_after: None })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = fast_policy(3)
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProviderError::RateLimited { retry_after: None })
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = fast_policy(5)
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProviderError::Unauthorized)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Permanent(ProviderError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_after_is_a_floor() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let policy = RetryPolicy {
            max_interval: Duration::from_millis(200),
            ..fast_policy(2)
        };
        policy
            .run(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ProviderError::RateLimited {
                            retry_after: Some(Duration::from_millis(50)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retry_after_beyond_max_interval_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let err = fast_policy(3)
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProviderError::RateLimited {
                        retry_after: Some(Duration::from_secs(3600)),
                    })
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
