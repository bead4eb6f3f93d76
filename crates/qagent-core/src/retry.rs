use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Bounded timeout plus a small number of retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32, base_backoff: Duration) -> Self {
        Self { timeout, max_attempts: max_attempts.max(1), base_backoff }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = attempt.min(5);
        self.base_backoff * 2u32.pow(capped)
    }

    /// Runs `op` until it succeeds or attempts run out.
    ///
    /// Each attempt is bounded by `timeout`. When every attempt timed out the
    /// result is `Error::GenerationTimeout`; otherwise the last failure is
    /// returned. Dropping the returned future abandons the in-flight attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt - 1)).await;
            }
            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    tracing::warn!(op = label, attempt = attempt + 1, error = %err, "attempt failed");
                    last_err = Some(err);
                }
                Err(_) => {
                    tracing::warn!(op = label, attempt = attempt + 1, timeout_ms = self.timeout.as_millis() as u64, "attempt timed out");
                }
            }
        }
        match last_err {
            Some(err) => Err(Error::Other(err.context(format!("{label} failed after {} attempt(s)", self.max_attempts)))),
            None => Err(Error::GenerationTimeout { attempts: self.max_attempts }),
        }
    }
}
