//! Bounded exponential backoff for startup-time retries.
use std::future::Future;
use std::time::Duration;

/// Track failures to incrementally delay retries.
///
/// Only used while the gateway starts (identity provider discovery); request
/// handling never retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    multiplier: u32,
    seen: u32,
}

impl Backoff {
    pub fn new(start_delay: Duration, max_retries: u32) -> Self {
        Self {
            delay: start_delay,
            max_delay: Duration::from_secs(30),
            max_retries,
            multiplier: 2,
            seen: 0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.seen += 1;
        if self.seen > self.max_retries {
            return None;
        }
        let delay = self.delay;
        self.delay = std::cmp::min(self.delay * self.multiplier, self.max_delay);
        Some(delay)
    }

    /// Runs `op` until it succeeds or the budget is spent; the last error is
    /// returned in that case.
    pub async fn retry<T, E, F, Fut>(mut self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            what,
                            attempt = self.seen,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "operation failed, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(what, attempts = self.seen, error = %err, "retries exhausted");
                        return Err(err);
                    }
                },
            }
        }
    }
}
