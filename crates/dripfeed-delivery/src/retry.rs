//! Exponential backoff retry policy with jitter.
//!
//! Failed delivery attempts are retried with exponentially growing delays
//! until the per-site attempt budget is exhausted, at which point the page
//! permanently leaves the delivery pool.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration for page delivery.
///
/// The delay schedule is uniform across failure kinds. The attempt budget
/// itself is a per-site setting and is passed into [`decide_retry`].
///
/// [`decide_retry`]: RetryPolicy::decide_retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base delay for exponential backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between retry attempts.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(6 * 3600),
            jitter_factor: 0.25, // ±25% randomization
        }
    }
}

/// Result of retry decision calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the delivery at the specified time.
    Retry {
        /// When the next delivery attempt should be made
        next_attempt_at: DateTime<Utc>,
    },
    /// Do not retry, delivery permanently failed.
    GiveUp {
        /// Reason why the delivery should not be retried
        reason: String,
    },
}

impl RetryPolicy {
    /// Determines if and when to retry after a failed attempt.
    ///
    /// `attempt_number` is 1-based and counts the attempt that just failed.
    /// `max_attempts` is the site's total attempt budget.
    pub fn decide_retry(
        &self,
        attempt_number: u32,
        max_attempts: u32,
        failed_at: DateTime<Utc>,
    ) -> RetryDecision {
        if attempt_number >= max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({max_attempts}) exhausted"),
            };
        }

        let delay = self.calculate_delay(attempt_number);
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { next_attempt_at: failed_at + chrono_delay }
    }

    /// Calculates the delay until the next retry attempt.
    ///
    /// Delay doubles with each failed attempt, capped at `max_delay`, with
    /// jitter applied so retries across pages do not align.
    fn calculate_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let base_delay = self.base_delay * multiplier;

        let capped_delay = std::cmp::min(base_delay, self.max_delay);
        let jittered_delay = apply_jitter(capped_delay, self.jitter_factor);

        std::cmp::min(jittered_delay, self.max_delay)
    }
}

/// Applies jitter to a duration to prevent thundering herd effects.
///
/// Randomizes the delay by ±jitter_factor percentage. For example, with
/// jitter_factor=0.25, a 10s delay becomes 7.5s to 12.5s randomly.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(6 * 3600),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn exponential_backoff_increases_correctly() {
        let policy = no_jitter_policy();

        let delays =
            (1..=5).map(|attempt| policy.calculate_delay(attempt)).collect::<Vec<_>>();

        // Should be: 60s, 120s, 240s, 480s, 960s
        assert_eq!(delays[0], Duration::from_secs(60));
        assert_eq!(delays[1], Duration::from_secs(120));
        assert_eq!(delays[2], Duration::from_secs(240));
        assert_eq!(delays[3], Duration::from_secs(480));
        assert_eq!(delays[4], Duration::from_secs(960));
    }

    #[test]
    fn retry_respects_attempt_budget() {
        let policy = no_jitter_policy();

        match policy.decide_retry(3, 3, Utc::now()) {
            RetryDecision::GiveUp { reason } => {
                assert!(reason.contains("maximum attempts"));
            },
            RetryDecision::Retry { .. } => {
                unreachable!("should not retry when at max attempts");
            },
        }
    }

    #[test]
    fn retry_scheduled_relative_to_failure_time() {
        let policy = no_jitter_policy();
        let failed_at = Utc::now();

        match policy.decide_retry(1, 3, failed_at) {
            RetryDecision::Retry { next_attempt_at } => {
                assert_eq!(next_attempt_at, failed_at + chrono::Duration::seconds(60));
            },
            RetryDecision::GiveUp { .. } => {
                unreachable!("first attempt within budget should retry");
            },
        }
    }

    #[test]
    fn max_delay_enforced() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(300),
            ..no_jitter_policy()
        };

        // High attempt number produces a large exponential delay
        let delay = policy.calculate_delay(15);
        assert!(delay <= Duration::from_secs(300));
    }

    #[test]
    fn jitter_varies_delay() {
        let base_delay = Duration::from_secs(10);
        let mut seen_delays = std::collections::HashSet::new();

        for _ in 0..20 {
            let jittered = apply_jitter(base_delay, 0.5);
            seen_delays.insert(jittered.as_millis());
        }

        assert!(seen_delays.len() > 1, "jitter should create variation");

        // All values within 5-15 seconds with 50% jitter
        for &delay_ms in &seen_delays {
            assert!(delay_ms >= 5_000, "delay too small: {delay_ms}ms");
            assert!(delay_ms <= 15_000, "delay too large: {delay_ms}ms");
        }
    }
}
