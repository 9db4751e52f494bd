//! Reconnect policy for the realtime socket.

use std::time::Duration;

/// Delay curve between reconnect attempts. Attempt numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `step × attempt`.
    Linear { step: Duration },
    /// Same delay every time.
    Fixed(Duration),
    /// `base × 2^(attempt-1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Self::Linear { step } => step.saturating_mul(attempt),
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1_u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How many times, and how patiently, a dropped socket is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnect attempts allowed after the last successful open.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Five attempts, 3s apart and growing linearly (3s, 6s, ... 15s).
    fn default() -> Self {
        Self { max_attempts: 5, backoff: Backoff::Linear { step: Duration::from_millis(3000) } }
    }
}

impl RetryPolicy {
    /// Never reconnect.
    #[must_use]
    pub fn never() -> Self {
        Self { max_attempts: 0, backoff: Backoff::Fixed(Duration::ZERO) }
    }

    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Delay before the next attempt given `attempts_made` since the last
    /// successful open, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        Some(self.delay_for(attempts_made + 1))
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
