//! Exponential backoff with jitter.
//!
//! Two policies are used:
//!
//! - [`RetryConfig::DEFAULT`]: GitHub API calls, 3 retries with 2s, 4s, 8s delays.
//!   Only transient errors are retried.
//! - [`RetryConfig::job_creation`]: job record creation, 8 attempts starting at
//!   250 time units, doubling, with 10% jitter. Every failure except "already
//!   exists" is retried.
//!
//! The job creation policy takes its time unit as a parameter. Production uses
//! one millisecond; tests pass [`Duration::ZERO`] so exhausted retries return
//! immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (cap for exponential growth).
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,

    /// Upper bound on the random extra fraction added to each delay.
    /// `0.1` stretches a 250ms delay to somewhere in `[250ms, 275ms)`.
    pub jitter: f64,
}

impl RetryConfig {
    /// Default retry configuration for GitHub API operations.
    ///
    /// - 3 retries with 2s, 4s, 8s delays
    /// - Total max wait: ~14 seconds
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
        jitter: 0.0,
    };

    /// Job creation policy measured in milliseconds.
    pub const JOB_CREATION: Self = Self {
        max_retries: 7,
        initial_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
        jitter: 0.1,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter: 0.0,
        }
    }

    /// The job creation policy with every delay expressed in `unit`s.
    ///
    /// `job_creation(Duration::from_millis(1)) == JOB_CREATION`.
    pub fn job_creation(unit: Duration) -> Self {
        Self {
            initial_delay: unit * 250,
            max_delay: unit * 60_000,
            ..Self::JOB_CREATION
        }
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Computes the un-jittered delay for the given retry attempt (0-indexed).
    ///
    /// The delay grows exponentially: `initial_delay * backoff_multiplier^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Returns an iterator over all un-jittered retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Total wait across all retries, ignoring jitter.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }

    /// Applies jitter to a delay: `delay * (1 + jitter * r)` with `r` in `[0, 1)`.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let r: f64 = rand::rng().random();
        delay.mul_f64(1.0 + self.jitter * r)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// The operation succeeded.
    Success(T),

    /// Every attempt failed with a retriable error.
    ExhaustedRetries {
        /// The last error encountered.
        last_error: E,
        /// Number of attempts made (including the initial attempt).
        attempts: u32,
    },

    /// An error the caller classified as not worth retrying.
    PermanentError(E),
}

impl<T, E> RetryResult<T, E> {
    /// Converts to a Result, treating exhausted retries and permanent errors as Err.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }
}

/// Executes an async operation with retry logic.
///
/// `operation` is called until it succeeds, returns an error for which
/// `is_retriable` is false, or the attempts allowed by `config` run out.
/// Between attempts the task sleeps for the jittered backoff delay.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: RetryConfig,
    is_retriable: R,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let max_attempts = config.max_attempts();

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                if !is_retriable(&e) {
                    return RetryResult::PermanentError(e);
                }
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let delay = config.jittered(config.delay_for_attempt(attempt - 1));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
