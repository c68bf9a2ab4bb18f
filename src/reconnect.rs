//! Retry bookkeeping for the realtime link.
//!
//! [`RetryBudget`] is the pure half of the reconnection state machine: it is
//! told about opens and abnormal closes and answers whether (and when) to try
//! again. The driver in [`crate::client`] owns the timer.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Close code for a shutdown the client asked for. Never retried.
pub const CLEAN_CLOSE: u16 = 1000;

/// Close code used when the link dropped without a close frame or never opened.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// How reconnect delays are computed and how many attempts are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub delay: Duration,
    /// Attempts allowed between two successful opens.
    pub max_attempts: u32,
    /// Growth factor per attempt; `1.0` keeps the delay fixed.
    pub backoff_multiplier: f64,
    /// Upper bound for a grown delay.
    pub max_delay: Duration,
    /// Add up to 20% random jitter to each delay.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_attempts: 5,
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let multiplier = self.backoff_multiplier.max(1.0).powi(exponent);
        let base_ms = (self.delay.as_millis() as f64 * multiplier) as u64;
        let base = Duration::from_millis(base_ms).min(self.max_delay.max(self.delay));
        if self.jitter {
            base + Duration::from_millis(jitter_ms(base))
        } else {
            base
        }
    }
}

/// Up to 20% of `base`, seeded from the clock's sub-second nanos.
fn jitter_ms(base: Duration) -> u64 {
    let range = (base.as_millis() as u64) / 5;
    if range == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos as u64) % (range + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule attempt number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Ceiling reached; stay down until a manual reconnect.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn on_abnormal_close(&mut self) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::Exhausted;
        }
        self.attempts += 1;
        RetryDecision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for_attempt(self.attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_by_default() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(3000));
        }
    }

    #[test]
    fn exponential_growth_is_capped() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(3),
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = ReconnectPolicy {
            jitter: true,
            ..Default::default()
        };
        for attempt in 1..=20 {
            let d = policy.delay_for_attempt(attempt);
            assert!(d >= Duration::from_millis(3000));
            assert!(d <= Duration::from_millis(3600));
        }
    }

    #[test]
    fn six_abnormal_closes_schedule_five_retries() {
        let mut budget = RetryBudget::new(ReconnectPolicy::default());
        let decisions: Vec<_> = (0..6).map(|_| budget.on_abnormal_close()).collect();
        let retries = decisions
            .iter()
            .filter(|d| matches!(d, RetryDecision::Retry { .. }))
            .count();
        assert_eq!(retries, 5);
        assert_eq!(decisions[5], RetryDecision::Exhausted);
        assert_eq!(
            decisions[4],
            RetryDecision::Retry {
                attempt: 5,
                delay: Duration::from_millis(3000)
            }
        );
    }

    #[test]
    fn open_resets_the_counter() {
        let mut budget = RetryBudget::new(ReconnectPolicy::default());
        budget.on_abnormal_close();
        budget.on_abnormal_close();
        assert_eq!(budget.attempts(), 2);
        budget.on_open();
        assert_eq!(budget.attempts(), 0);
        assert!(matches!(
            budget.on_abnormal_close(),
            RetryDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_ceiling_never_retries() {
        let mut budget = RetryBudget::new(ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(budget.on_abnormal_close(), RetryDecision::Exhausted);
    }
}
