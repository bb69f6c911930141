use std::{future::Future, time::Duration};

use tracing::warn;

use crate::{api::EndpointResult, clock::Clock};

/// Retry budget for idempotent status requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Runs `request`, retrying transient failures with doubling backoff.
pub async fn retry_request<T, F, Fut>(
    clock: &dyn Clock,
    policy: &RetryPolicy,
    what: &str,
    mut request: F,
) -> EndpointResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EndpointResult<T>>,
{
    let mut attempt = 0;
    let mut backoff = policy.initial_backoff;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    error = %err,
                    "{what} failed, retrying in {:?}",
                    backoff
                );
                clock.sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, error::EndpointError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_with_backoff() {
        let clock = ManualClock::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_request(&clock, &RetryPolicy::default(), "get batch", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EndpointError::new("bad gateway", Some(502)))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let clock = ManualClock::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: EndpointResult<()> =
            retry_request(&clock, &RetryPolicy::default(), "get batch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EndpointError::new("connection reset", None))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn backoff_saturates_instead_of_overflowing() {
        let clock = ManualClock::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_secs(u64::MAX / 2),
        };

        let result: EndpointResult<()> =
            retry_request(&clock, &policy, "get batch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EndpointError::new("bad gateway", Some(502)))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(clock.elapsed(), Duration::MAX);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let clock = ManualClock::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: EndpointResult<()> =
            retry_request(&clock, &RetryPolicy::default(), "get result", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EndpointError::new("forbidden", Some(403)))
            })
            .await;

        assert_eq!(result.unwrap_err().status_code, Some(403));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
