//! Retry strategies for webhook delivery.

use rand::Rng;
use std::time::Duration;

/// Trait for retry strategies.
///
/// `attempts` is always the number of attempts already made (at least 1 when
/// asked for a delay).
pub trait RetryStrategy: Send + Sync {
    /// Returns the delay before the next attempt, or None if the budget is spent.
    fn next_delay(&self, attempts: u32) -> Option<Duration>;

    /// Returns the maximum number of attempts, including the first.
    fn max_attempts(&self) -> u32;
}

/// Exponential backoff retry strategy.
///
/// Delay after attempt `n`: `base * multiplier^(n-1)`, capped at `max_delay`.
/// The defaults give 1s, 5s, 25s over four attempts.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay after the first attempt.
    pub base: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0), added on top of the computed delay.
    pub jitter: f64,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff strategy.
    pub fn new() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 5,
            max_delay: Duration::from_secs(25),
            max_attempts: 4,
            jitter: 0.0,
        }
    }

    /// Sets the base delay.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sets the multiplier.
    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Sets the maximum delay.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Sets the maximum attempts.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Sets the jitter factor.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts == 0 || attempts >= self.max_attempts {
            return None;
        }

        let factor = self.multiplier.saturating_pow(attempts - 1);
        let delay = std::cmp::min(self.base.saturating_mul(factor), self.max_delay);

        if self.jitter > 0.0 {
            let jitter_range = delay.as_millis() as f64 * self.jitter;
            let jitter_offset = rand::thread_rng().gen_range(0.0..=jitter_range) as u64;
            Some(delay + Duration::from_millis(jitter_offset))
        } else {
            Some(delay)
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay retry strategy.
///
/// Always uses the same delay between attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Maximum number of attempts.
    pub max_attempts: u32,
}

impl FixedDelay {
    /// Creates a new fixed delay strategy.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: 3,
        }
    }

    /// Sets the maximum attempts.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts == 0 || attempts >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
