//! Retry/backoff policy for cluster calls.
//!
//! All timing decisions live here so the phase transition table stays
//! purely deterministic given an outcome classification. Every storage
//! action the orchestrator issues goes through [`Retrier::run`].

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use docshift_types::ClusterError;

use crate::errors::MigrationError;

/// Bounded exponential backoff with a maximum attempt ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Compute the delay before retry number `attempt` (1-based).
pub(crate) fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let delay = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(exp));
    delay.min(policy.max_delay)
}

/// Applies a [`RetryPolicy`] uniformly to cluster calls and counts the
/// retries issued over a run.
pub struct Retrier {
    policy: RetryPolicy,
    retries: AtomicU32,
}

impl Retrier {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retries: AtomicU32::new(0),
        }
    }

    /// Total retries issued so far.
    #[must_use]
    pub fn total_retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Run a cluster call under the policy.
    ///
    /// Retryable errors are absorbed with exponential backoff up to the
    /// attempt ceiling; exhausting the ceiling, or any non-retryable
    /// error, surfaces as a [`MigrationError::Cluster`] that the
    /// orchestrator treats as fatal.
    ///
    /// # Errors
    ///
    /// Returns the final [`ClusterError`] wrapped in
    /// [`MigrationError::Cluster`].
    pub async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, MigrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClusterError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = backoff_delay(&self.policy, attempt);
                    #[allow(clippy::cast_possible_truncation)]
                    // Safety: delay.as_millis() is always well under u64::MAX
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        op,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms,
                        category = %err.category,
                        "Retryable cluster error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(
                            op,
                            attempt,
                            category = %err.category,
                            "Retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(
                            op,
                            category = %err.category,
                            "Non-retryable cluster error"
                        );
                    }
                    return Err(MigrationError::Cluster(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as Counter;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_millis(450));
        assert_eq!(backoff_delay(&policy, 30), Duration::from_millis(450));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let retrier = Retrier::new(fast_policy(5));
        let calls = Counter::new(0);
        let result = retrier
            .run("op", || async {
                let n = calls.fetch_add(1, Ordering::Relaxed);
                if n < 3 {
                    Err(ClusterError::network("reset"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(retrier.total_retries(), 3);
    }

    #[tokio::test]
    async fn exhausting_the_ceiling_surfaces_the_last_error() {
        let retrier = Retrier::new(fast_policy(3));
        let calls = Counter::new(0);
        let err = retrier
            .run("op", || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(ClusterError::not_ready("still red"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(matches!(err, MigrationError::Cluster(e) if e.is_retryable()));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let retrier = Retrier::new(fast_policy(5));
        let calls = Counter::new(0);
        let err = retrier
            .run("op", || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(ClusterError::auth("forbidden"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(retrier.total_retries(), 0);
        assert!(!err.is_retryable());
    }
}
