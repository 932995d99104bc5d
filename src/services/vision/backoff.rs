// Retry budget and exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

use crate::core::config::RetryConfig;

/// Bounded retry policy for vision calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Fresh backoff sequence for one item
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.base_delay,
            max: self.max_delay,
            retries: 0,
            last: Duration::ZERO,
        }
    }
}

/// Delay sequence: base * 2^n capped at max, plus jitter in [0, base).
/// Never decreases, never exceeds max + base.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    retries: u32,
    last: Duration,
}

impl Backoff {
    /// Delay before the next retry. `floor` (e.g. a Retry-After hint) raises
    /// the delay but is still capped.
    pub fn next_delay(&mut self, floor: Option<Duration>) -> Duration {
        let exponential = self
            .base
            .saturating_mul(2u32.saturating_pow(self.retries))
            .min(self.max);

        let jitter_ms = rand::thread_rng().gen_range(0..(self.base.as_millis() as u64).max(1));
        let mut delay = exponential + Duration::from_millis(jitter_ms);

        if let Some(floor) = floor {
            delay = delay.max(floor.min(self.max));
        }

        let ceiling = self.max + self.base;
        delay = delay.max(self.last).min(ceiling);

        self.retries = self.retries.saturating_add(1);
        self.last = delay;
        delay
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}
