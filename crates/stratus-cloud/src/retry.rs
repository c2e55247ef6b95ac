//! Bounded retry of mutating remote calls

use crate::error::{ApiError, CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a failed attempt
#[derive(Debug)]
pub enum RetryError {
    /// Try again after a delay, unless the timeout has passed
    Retryable(CloudError),
    /// Stop immediately and surface the error
    Fatal(CloudError),
}

impl RetryError {
    pub fn retryable(err: impl Into<CloudError>) -> Self {
        RetryError::Retryable(err.into())
    }

    pub fn fatal(err: impl Into<CloudError>) -> Self {
        RetryError::Fatal(err.into())
    }
}

/// Retry configuration: a time budget with exponential backoff between attempts
#[derive(Debug, Clone)]
pub struct RetrySpec {
    /// Total time budget for all attempts
    pub timeout: Duration,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetrySpec {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Invoke `operation` until it succeeds, fails fatally, or `spec.timeout` passes
///
/// On timeout the last retryable error is kept inside
/// [`CloudError::RetryTimeout`].
pub async fn retry<T, F, Fut>(resource_id: &str, spec: &RetrySpec, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let deadline = Instant::now() + spec.timeout;
    let mut delay = spec.initial_delay;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(resource = %resource_id, attempts, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(RetryError::Fatal(err)) => return Err(err),
            Err(RetryError::Retryable(err)) => err,
        };

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(resource = %resource_id, attempts, error = %err, "Retry budget exhausted");
            return Err(CloudError::RetryTimeout {
                resource_id: resource_id.to_string(),
                timeout: spec.timeout,
                last: Box::new(err),
            });
        }

        tracing::debug!(
            resource = %resource_id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable failure"
        );
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = spec.next_delay(delay);
    }
}

/// Classify the result of a remote deletion call
///
/// A dependency that still references the object is retryable, an object
/// that is already gone counts as deleted, and anything else is fatal.
pub fn classify_delete(result: Result<()>) -> std::result::Result<(), RetryError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => {
            tracing::debug!(error = %err, "Object already gone, treating delete as done");
            Ok(())
        }
        Err(err) if err.api_error().is_some_and(ApiError::is_dependency_violation) => {
            Err(RetryError::Retryable(err))
        }
        Err(err) => Err(RetryError::Fatal(err)),
    }
}

/// Retry a deletion call with the [`classify_delete`] policy
pub async fn retry_delete<F, Fut>(resource_id: &str, spec: &RetrySpec, mut delete: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    retry(resource_id, spec, || {
        let attempt = delete();
        async move { classify_delete(attempt.await) }
    })
    .await
}
