//! # Retry Policy
//!
//! Backoff between sync passes that were aborted by a transport failure.
//!
//! ```text
//!   pass aborted (Network / Timeout)
//!        │
//!        ▼
//!   next_backoff() ──► Some(delay) ──► sleep ──► retry pass
//!        │
//!        └──────────► None (attempts exhausted) ──► wait for next
//!                                                    connectivity change
//!
//!   BACKOFF STRATEGY (Exponential with Jitter)
//!   Attempt 1: 1s    Attempt 2: 2s    Attempt 3: 4s   ...   Max: 60s
//! ```
//!
//! The coordinator takes any [`Backoff`] so tests can inject
//! `backoff::backoff::Zero` or `Constant` instead of waiting on real
//! delays.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Boxed strategy the coordinator holds.
pub type BoxedBackoff = Box<dyn Backoff + Send + Sync>;

/// Retry parameters for aborted sync passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries before giving up until the next connectivity change.
    /// 0 means unlimited.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Randomization factor (0.0 = no jitter).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Builds the exponential strategy described by this policy.
    pub fn build(&self) -> BoxedBackoff {
        let exponential = ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            randomization_factor: self.jitter,
            multiplier: 2.0,
            max_elapsed_time: None, // Bounded by attempts instead
            ..Default::default()
        };
        Box::new(Limited::new(exponential, self.max_attempts))
    }
}

/// Caps another strategy at a fixed number of delays.
#[derive(Debug)]
pub struct Limited<B> {
    inner: B,
    max_attempts: u32,
    attempts: u32,
}

impl<B: Backoff> Limited<B> {
    /// `max_attempts == 0` never stops.
    pub fn new(inner: B, max_attempts: u32) -> Self {
        Limited {
            inner,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl<B: Backoff> Backoff for Limited<B> {
    fn reset(&mut self) {
        self.attempts = 0;
        self.inner.reset();
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.inner.next_backoff()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Constant;

    #[test]
    fn test_limited_stops_and_resets() {
        let mut b = Limited::new(Constant::new(Duration::from_millis(5)), 2);
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(5)));
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(5)));
        assert_eq!(b.next_backoff(), None);

        b.reset();
        assert_eq!(b.attempts(), 0);
        assert!(b.next_backoff().is_some());
    }

    #[test]
    fn test_zero_max_attempts_is_unlimited() {
        let mut b = Limited::new(Constant::new(Duration::ZERO), 0);
        for _ in 0..100 {
            assert!(b.next_backoff().is_some());
        }
    }

    #[test]
    fn test_policy_grows_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter: 0.0,
        };
        let mut b = policy.build();
        for expected_ms in [100, 200, 250] {
            let delay = b.next_backoff().unwrap();
            assert_eq!(delay.as_millis(), expected_ms);
        }
        assert_eq!(b.next_backoff(), None);
    }
}
