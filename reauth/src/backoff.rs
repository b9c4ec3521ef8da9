//! Retry backoff handling

use std::time::Duration;

/// Configuration for how long to wait between failed refresh attempts and
/// when to give up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    step: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    /// Default retry configuration
    ///
    /// Waits 5 seconds longer after each failed attempt, capped at 60 seconds,
    /// and gives up after 5 attempts.
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Constructs a new retry configuration
    ///
    /// After the `n`th consecutive failure the delay is `n * step`, capped at
    /// `max_delay`. No more than `max_attempts` attempts are made.
    pub fn new(step: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            step,
            max_delay,
            max_attempts,
        }
    }

    /// The most attempts that will be made
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay to apply after `failures` consecutive failed attempts
    pub fn delay_after(&self, failures: u32) -> Duration {
        self.step.saturating_mul(failures).min(self.max_delay)
    }
}

/// The outcome of reporting a failed attempt to a [`RetryHandler`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retry {
    /// Wait for the given delay before the next attempt
    After(Duration),
    /// No attempts remain; the final delay still elapses before giving up
    Exhausted(Duration),
}

/// A stateful handler that tracks failed attempts against a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryHandler {
    /// Constructs a new handler from a [`RetryPolicy`]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// The number of failed attempts reported so far
    #[inline]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Reports a failure and returns what to do next
    pub fn failure(&mut self) -> Retry {
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.delay_after(self.failures);
        if self.failures >= self.policy.max_attempts {
            Retry::Exhausted(delay)
        } else {
            Retry::After(delay)
        }
    }
}

impl From<RetryPolicy> for RetryHandler {
    fn from(policy: RetryPolicy) -> Self {
        Self::new(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_grow_linearly() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=4).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, [5, 10, 15, 20]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(12), Duration::from_secs(60));
        assert_eq!(policy.delay_after(100), Duration::from_secs(60));
    }

    #[test]
    fn handler_exhausts_on_final_attempt() {
        let mut handler = RetryHandler::from(RetryPolicy::default());
        for n in 1u32..5 {
            assert_eq!(handler.failure(), Retry::After(Duration::from_secs(5 * u64::from(n))));
        }
        assert_eq!(handler.failure(), Retry::Exhausted(Duration::from_secs(25)));
        assert_eq!(handler.failures(), 5);
    }

    #[test]
    fn single_attempt_policy_exhausts_immediately() {
        let mut handler = RetryHandler::new(RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(1), 1));
        assert_eq!(handler.failure(), Retry::Exhausted(Duration::from_secs(1)));
        assert_eq!(handler.failures(), 1);
    }
}
