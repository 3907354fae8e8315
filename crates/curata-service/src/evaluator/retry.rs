use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Bounded-retry policy with linear backoff. Only errors the caller's
/// predicate classifies as transient are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay applied after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `op` until it succeeds, the attempt budget is exhausted, or a
/// non-transient error occurs. The final error propagates unchanged.
pub async fn retry_transient<T, E, F, Fut, P>(
    policy: RetryPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                warn!(attempt, error = %err, "Transient upstream error, retrying");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn immediate_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Cell::new(0u32);
        let result: Result<&str, String> = retry_transient(
            immediate_policy(3),
            |_| true,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(format!("flaky {n}"))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Cell::new(0u32);
        let result: Result<(), String> = retry_transient(
            immediate_policy(3),
            |_| true,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("attempt {n}")) }
            },
        )
        .await;

        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let calls = Cell::new(0u32);
        let result: Result<(), String> = retry_transient(
            immediate_policy(3),
            |err: &String| err.contains("transient"),
            || {
                calls.set(calls.get() + 1);
                async { Err("permanent failure".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }
}
