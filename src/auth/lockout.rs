//! Sliding-window brute-force lockout policy.
//!
//! The policy is a pure decision over a ledger count: it never stores a
//! "locked" flag. Failures age out of the window naturally, so a successful
//! login does not need to clear anything.
//!
//! Accounting is keyed by the username supplied to `login`, which is
//! caller-controlled before any identity is established. An attacker can
//! therefore exhaust the counter for a victim's username without valid
//! credentials; that is inherent to password-grant lockout by username and
//! is kept as-is.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_LOCKOUT_THRESHOLD: u64 = 5;
pub const DEFAULT_LOCKOUT_WINDOW_MINUTES: i64 = 15;

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    threshold: u64,
    window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOCKOUT_THRESHOLD, DEFAULT_LOCKOUT_WINDOW_MINUTES)
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u64, window_minutes: i64) -> Self {
        Self {
            threshold,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Start of the trailing window, evaluated against the same clock used
    /// for ledger writes. Failures at or before this instant are excluded.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    #[must_use]
    pub fn evaluate(&self, failed_attempts: u64) -> LockoutDecision {
        LockoutDecision {
            locked: failed_attempts >= self.threshold,
            failed_attempts,
            window: self.window,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// Derived per attempt; has no lifecycle of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutDecision {
    pub locked: bool,
    pub failed_attempts: u64,
    pub window: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_at_threshold_not_before() {
        let policy = LockoutPolicy::default();
        assert!(!policy.evaluate(0).locked);
        assert!(!policy.evaluate(4).locked);
        assert!(policy.evaluate(5).locked);
        assert!(policy.evaluate(50).locked);
    }

    #[test]
    fn window_start_trails_now_by_the_configured_minutes() {
        let policy = LockoutPolicy::new(3, 10);
        let now = Utc::now();
        assert_eq!(now - policy.window_start(now), Duration::minutes(10));
    }

    #[test]
    fn decision_carries_the_inputs() {
        let policy = LockoutPolicy::default();
        let decision = policy.evaluate(7);
        assert_eq!(decision.failed_attempts, 7);
        assert_eq!(decision.window, Duration::minutes(15));
        assert!(decision.locked);
    }
}
