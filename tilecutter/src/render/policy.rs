//! Retry policy for transient source failures.
//!
//! Only [`SourceError::Unavailable`] is retried; every other source error
//! excludes the source from the tile immediately.

use std::time::Duration;

use crate::raster::SourceError;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default cap on the delay between retries (2 seconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 2000;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a source read handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Fail on the first error.
    None,

    /// Constant delay between attempts.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        delay: Duration,
    },

    /// Delay grows by `multiplier` after each failure, up to `max_delay`.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        match Self::default() {
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            },
            other => other,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before retry number `attempt` (1 is the first retry), or
    /// `None` when the attempts are used up.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }

    /// True when `error` on attempt `attempt` (1-based) should be retried.
    pub fn should_retry(&self, error: &SourceError, attempt: u32) -> bool {
        error.is_retryable() && self.delay_for_attempt(attempt).is_some()
    }
}
