//! Circuit breaker for a single lane
//!
//! Closed → Open after `threshold` failures. The open state is not reset by a
//! timer: it is re-evaluated lazily, and once the cooldown since the last
//! failure has elapsed the breaker reads as closed and the lane is tried again.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Lane is dispatched normally
    Closed,
    /// Lane is skipped until the cooldown elapses
    Open,
}

/// Circuit breaker for one lane
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Failures since the breaker was created (not cleared by a success)
    consecutive_failures: u32,
    /// Time of the most recent Failed/Timeout outcome
    last_failure: Option<Instant>,
    /// Set when the threshold is reached, cleared by a success
    open: bool,
    /// Failures needed to open
    failure_threshold: u32,
    /// How long an open breaker keeps skipping the lane
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            open: false,
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Record a Failed or Timeout outcome
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        if self.consecutive_failures >= self.failure_threshold {
            self.open = true;
        }
    }

    /// Record a Completed outcome. Only the open flag is cleared; the counter
    /// is kept, so one more failure inside the window re-opens the breaker.
    pub fn record_success(&mut self) {
        self.open = false;
    }

    /// Whether the lane should be skipped right now.
    ///
    /// An open breaker whose cooldown has elapsed is closed here.
    pub fn should_skip(&mut self) -> bool {
        if self.open && !self.within_cooldown() {
            self.open = false;
        }
        self.open
    }

    /// Read-only view of `should_skip`
    pub fn state(&self) -> CircuitState {
        if self.open && self.within_cooldown() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    fn within_cooldown(&self) -> bool {
        self.last_failure
            .map(|at| at.elapsed() < self.cooldown)
            .unwrap_or(false)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_opens() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));

        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.should_skip());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closes_after_cooldown() {
        let mut cb = CircuitBreaker::new(2, Duration::from_millis(100));

        cb.record_failure();
        cb.record_failure();
        assert!(cb.should_skip());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.should_skip());
        // Counter survives the cooldown
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_cooldown_reopens_immediately() {
        let mut cb = CircuitBreaker::new(2, Duration::from_millis(100));

        cb.record_failure();
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!cb.should_skip());

        cb.record_failure();
        assert!(cb.should_skip());
    }

    #[test]
    fn test_success_clears_open_flag_only() {
        let mut cb = CircuitBreaker::new(2, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert!(cb.should_skip());

        cb.record_success();
        assert!(!cb.should_skip());
        assert_eq!(cb.consecutive_failures(), 2);

        cb.record_failure();
        assert!(cb.should_skip());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut cb = CircuitBreaker::new(0, Duration::from_secs(60));
        assert!(!cb.should_skip());
        cb.record_failure();
        assert!(cb.should_skip());
    }
}
