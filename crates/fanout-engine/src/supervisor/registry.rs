//! Per-lane circuit breaker registry

use super::{CircuitBreaker, CircuitState};
use fanout_shared::LaneStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Milliseconds since the last failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_ago_ms: Option<u64>,
}

/// Registry of lane breakers. Each lane only ever touches its own entry.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            failure_threshold,
            cooldown,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check if the lane should be skipped before dispatch
    pub async fn should_skip(&self, lane: &str) -> bool {
        let mut breakers = self.breakers.write().await;
        breakers
            .get_mut(lane)
            .map(|cb| cb.should_skip())
            .unwrap_or(false)
    }

    /// Feed a lane outcome into its breaker. Skipped / Deferred are ignored.
    pub async fn record_outcome(&self, lane: &str, status: LaneStatus) {
        match status {
            LaneStatus::Completed => self.record_success(lane).await,
            LaneStatus::Failed | LaneStatus::Timeout => self.record_failure(lane).await,
            _ => {}
        }
    }

    /// Record lane failure
    pub async fn record_failure(&self, lane: &str) {
        let mut breakers = self.breakers.write().await;
        let cb = breakers
            .entry(lane.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown));

        let was_open = cb.state() == CircuitState::Open;
        cb.record_failure();
        if !was_open && cb.state() == CircuitState::Open {
            warn!(
                lane = lane,
                failures = cb.consecutive_failures(),
                cooldown_ms = self.cooldown.as_millis() as u64,
                "circuit breaker opened"
            );
        }
    }

    /// Record lane success
    pub async fn record_success(&self, lane: &str) {
        let mut breakers = self.breakers.write().await;
        if let Some(cb) = breakers.get_mut(lane) {
            cb.record_success();
        }
    }

    /// Current state of a lane's breaker (closed if never seen)
    pub async fn state(&self, lane: &str) -> CircuitState {
        let breakers = self.breakers.read().await;
        breakers
            .get(lane)
            .map(|cb| cb.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Lanes whose breaker is currently open, sorted
    pub async fn open_lanes(&self) -> Vec<String> {
        let breakers = self.breakers.read().await;
        let mut open: Vec<String> = breakers
            .iter()
            .filter(|(_, cb)| cb.state() == CircuitState::Open)
            .map(|(name, _)| name.clone())
            .collect();
        open.sort();
        open
    }

    /// Snapshot of every breaker that has seen a failure
    pub async fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        let breakers = self.breakers.read().await;
        breakers
            .iter()
            .map(|(name, cb)| {
                (
                    name.clone(),
                    BreakerSnapshot {
                        state: cb.state(),
                        consecutive_failures: cb.consecutive_failures(),
                        last_failure_ago_ms: cb
                            .last_failure()
                            .map(|at| at.elapsed().as_millis() as u64),
                    },
                )
            })
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_lane_is_closed() {
        let registry = CircuitBreakerRegistry::default();
        assert!(!registry.should_skip("web").await);
        assert_eq!(registry.state("web").await, CircuitState::Closed);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_circuit_breaker_integration() {
        let registry = CircuitBreakerRegistry::new(5, Duration::from_secs(60));

        for _ in 0..4 {
            registry.record_outcome("knowledge_graph", LaneStatus::Failed).await;
        }
        assert!(!registry.should_skip("knowledge_graph").await);

        registry.record_outcome("knowledge_graph", LaneStatus::Timeout).await;
        assert!(registry.should_skip("knowledge_graph").await);
        assert_eq!(registry.open_lanes().await, vec!["knowledge_graph".to_string()]);

        // Other lanes are unaffected
        assert!(!registry.should_skip("vector").await);
    }

    #[tokio::test]
    async fn test_skipped_and_deferred_do_not_count() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(60));
        registry.record_outcome("video", LaneStatus::Skipped).await;
        registry.record_outcome("video", LaneStatus::Deferred).await;
        assert!(!registry.should_skip("video").await);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reports_failures() {
        let registry = CircuitBreakerRegistry::new(3, Duration::from_secs(60));
        registry.record_failure("vector").await;
        registry.record_failure("vector").await;

        let snapshot = registry.snapshot().await;
        let vector = &snapshot["vector"];
        assert_eq!(vector.consecutive_failures, 2);
        assert_eq!(vector.state, CircuitState::Closed);
        assert!(vector.last_failure_ago_ms.is_some());
    }
}
