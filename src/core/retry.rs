//! Blocking retry with exponential backoff.
//!
//! Outgoing deliveries (webhook batches, chat alerts) go through
//! [`retry_if`] so transient endpoint failures are retried a bounded number
//! of times while permanent ones fail immediately.

use std::time::{Duration, Instant};

/// Backoff policy for a delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_attempts: u32,
    /// Pause before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single pause.
    pub max_delay: Duration,
    /// Growth factor between consecutive pauses.
    pub backoff_multiplier: f64,
    /// Spread pauses by up to a quarter to avoid synchronized retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::with_retries(3)
    }
}

impl RetryConfig {
    /// Policy used for configured outputs: `retries` retries, starting at
    /// 100 ms and doubling up to 30 s.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Two fast retries, for notifications that should not hold up a pass.
    pub fn quick() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            ..Self::with_retries(2)
        }
    }

    /// Pause before retry number `retry` (1-based). Retry 0 never waits.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let Some(exponent) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };

        let grown = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let mut secs = grown.min(self.max_delay.as_secs_f64());
        if self.jitter {
            secs *= 1.0 + jitter_fraction() / 4.0;
        }

        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

/// Clock-derived value in `[0, 1)`.
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    f64::from(nanos % 1024) / 1024.0
}

/// Final outcome of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    /// Attempts made, including the first.
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Retry `operation` on every error.
pub fn retry<T, E, F>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    retry_if(config, operation, |_| true)
}

/// Retry `operation` while `is_transient` accepts its error.
pub fn retry_if<T, E, F, P>(config: &RetryConfig, mut operation: F, is_transient: P) -> RetryResult<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let result = operation();

        let exhausted = attempts > config.max_attempts;
        match result {
            Err(ref e) if !exhausted && is_transient(e) => {
                let delay = config.delay_for_attempt(attempts);
                tracing::debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Delivery failed, retrying");
                std::thread::sleep(delay);
            }
            result => return RetryResult { result, attempts, elapsed: started.elapsed() },
        }
    }
}
