/// Backoff schedule for connection attempts
///
/// Attempt `k` (0-based) that fails waits
/// `min(initial_backoff * 2^k, max_backoff)` before attempt `k + 1`.
/// With the defaults this is 2s, 4s, 8s, 16s, then 30s. There is no jitter.

use std::time::Duration;

/// Maximum connection attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay after the first failed attempt
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Ceiling for any single delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after attempt 0
    pub initial_backoff: Duration,

    /// Upper bound for every delay
    pub max_backoff: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.initial_backoff.checked_mul(factor))
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Sum of the delays after the first `failures` attempts
    pub fn total_delay(&self, failures: u32) -> Duration {
        (0..failures).map(|attempt| self.delay_for(attempt)).sum()
    }

    /// Attempt budget, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..5).map(|k| policy.delay_for(k).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30]);
    }

    #[test]
    fn test_delay_is_capped_for_large_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(31), Duration::from_secs(30));
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
    }

    #[test]
    fn test_total_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.total_delay(0), Duration::ZERO);
        assert_eq!(policy.total_delay(3), Duration::from_secs(2 + 4 + 8));
        assert_eq!(policy.total_delay(5), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.attempts(), 1);
    }
}
