use std::time::Duration;

/// Delay schedule for polling and conflict retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Delay multiplier between attempts; 1 gives a fixed interval
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
            max_attempts,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2,
            max_attempts,
        }
    }

    /// Delay before retrying after the given attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for Backoff {
    /// Service status polling: every 10s for up to 15 minutes.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10), 90)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_up_to_max() {
        let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(10), 6);
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(64), Duration::from_secs(10));
    }

    #[test]
    fn fixed_never_grows() {
        let backoff = Backoff::fixed(Duration::from_millis(500), 3);
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for_attempt(30), Duration::from_millis(500));
    }
}
