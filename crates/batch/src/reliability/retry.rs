//! Retry policy for transient item faults

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How often, and how patiently, a transiently failing item is retried
///
/// `max_attempts` counts every invocation of the item operation, the first
/// one included, so it is the batch `retry_limit`. The batch default retries
/// immediately; backoff is opt-in.
///
/// # Example
///
/// ```
/// use chunkwise_batch::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(4)
///     .with_initial_interval(Duration::from_millis(250))
///     .with_jitter(0.0);
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(250));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
/// assert!(!policy.has_attempts_remaining(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Operation invocations per item, first one included
    pub max_attempts: u32,

    /// Wait before the first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Upper bound for any single wait
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Growth factor of the wait from one retry to the next
    pub backoff_coefficient: f64,

    /// Relative spread applied to each wait (0.1 = ±10%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(3)
    }
}

impl RetryPolicy {
    /// Three attempts, waits of 100ms doubling up to 5s, ±10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// `max_attempts` attempts back to back
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(Duration::ZERO, max_attempts)
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// `max_attempts` attempts with the same wait between each
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Also raises `max_interval` when it would cap the first wait
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self.max_interval = self.max_interval.max(interval);
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Clamped to `0.0..=1.0`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait before `attempt` (1-based); the first attempt never waits
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt < 2 || self.initial_interval.is_zero() {
            return Duration::ZERO;
        }

        // attempt 2 is the first retry and waits initial_interval
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let growth = self.backoff_coefficient.powi(exponent);
        let wait = if growth == 1.0 {
            self.initial_interval.min(self.max_interval)
        } else {
            let secs = (self.initial_interval.as_secs_f64() * growth)
                .min(self.max_interval.as_secs_f64());
            Duration::from_secs_f64(secs)
        };

        if self.jitter <= 0.0 || wait.is_zero() {
            return wait;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64(wait.as_secs_f64() * factor)
    }

    /// Whether another attempt may follow attempt number `attempt`
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 3);
        for attempt in 1..=3 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::ZERO);
        }
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
        assert_eq!(RetryPolicy::fixed(Duration::ZERO, 0).max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
        assert!(!RetryPolicy::no_retry().has_attempts_remaining(1));
    }

    #[test]
    fn test_fixed_waits_do_not_grow() {
        let policy = RetryPolicy::fixed(Duration::from_millis(50), 5);

        for attempt in 2..=5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(50));
        }
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy = RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(3))
            .with_jitter(0.0);

        let waits: Vec<Duration> = (1..=5).map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(
            waits,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn test_initial_interval_lifts_cap() {
        let policy = RetryPolicy::immediate(3).with_initial_interval(Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1000), 3).with_jitter(0.2);

        for _ in 0..50 {
            let wait = policy.delay_for_attempt(2);
            assert!(wait >= Duration::from_millis(799), "{wait:?}");
            assert!(wait <= Duration::from_millis(1201), "{wait:?}");
        }
    }

    #[test]
    fn test_serializes_intervals_as_millis() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1500), 2);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["initial_interval"], 1500);

        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, policy);
    }
}
