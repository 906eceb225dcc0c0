//! Bounded retry for page requests.
//!
//! A request that fails with a retryable [`ShopifyError`] is tried again after
//! a wait, at most `max_retries` times after the first attempt. The wait is
//! the server's `Retry-After` when it sent one, otherwise `default_wait`,
//! capped at `max_wait`, plus `buffer` in both cases. Waiting goes through a
//! [`Sleeper`] so tests can observe waits without spending them.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::ShopifyError;

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Waits on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order.
    #[must_use]
    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

/// Retry bounds and waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait when the server suggests none.
    pub default_wait: Duration,
    /// Ceiling on any single wait before the buffer is added.
    pub max_wait: Duration,
    /// Added to every wait.
    pub buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
            buffer: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// How long to wait before retrying after `error`.
    #[must_use]
    pub fn wait_for(&self, error: &ShopifyError) -> Duration {
        error
            .retry_after()
            .unwrap_or(self.default_wait)
            .min(self.max_wait)
            .saturating_add(self.buffer)
    }
}

/// Runs requests under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    #[must_use]
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` until it succeeds, fails for good, or the bound is hit.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once
    /// `max_retries` retries have been spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, ShopifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ShopifyError>>,
    {
        let mut retries = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && retries < self.policy.max_retries => {
                    retries += 1;
                    let wait = self.policy.wait_for(&error);
                    warn!(
                        operation,
                        attempt = retries,
                        max_retries = self.policy.max_retries,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retrying Shopify request"
                    );
                    self.sleeper.sleep(wait).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
