use std::time::Duration;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Attempt budget and backoff for one call site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one; a multiplier below one is
    /// treated as constant delay.
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
        }
    }

    /// Reconnection policy for remote calls: 3 attempts, 250 ms doubling.
    pub fn channel_default() -> Self {
        Self::new(3, Duration::from_millis(250), 2.0)
    }

    /// Liveness probing: 3 pings, 1 s apart.
    pub fn liveness_default() -> Self {
        Self::new(3, Duration::from_secs(1), 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = MAX_DELAY.max(self.base_delay).as_secs_f64();
        let mut delay = self.base_delay.as_secs_f64();
        for _ in 1..attempt {
            if delay >= cap {
                break;
            }
            delay *= self.multiplier;
        }
        Duration::from_secs_f64(delay.min(cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::channel_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, 2.0).max_attempts(), 1);
    }

    #[test]
    fn channel_delays_double() {
        let policy = RetryPolicy::channel_default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1000));
    }

    #[test]
    fn liveness_delay_is_constant() {
        let policy = RetryPolicy::liveness_default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn delays_never_shrink_and_stay_capped(
            base_ms in 0u64..5_000,
            multiplier in 1.0f64..4.0,
            attempt in 1u32..64,
        ) {
            let policy = RetryPolicy::new(5, Duration::from_millis(base_ms), multiplier);
            let current = policy.delay_after(attempt);
            let next = policy.delay_after(attempt + 1);
            prop_assert!(next >= current);
            prop_assert!(current <= MAX_DELAY.max(policy.base_delay()));
        }
    }
}
