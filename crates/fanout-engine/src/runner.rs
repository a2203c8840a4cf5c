//! Lane runner: one lane, one query, one uniform [`LaneResult`].
//!
//! ## Algorithm
//!
//! 1. Breaker open → `Skipped` (elapsed 0, allocation goes to the slack pool)
//! 2. `effective = min(declared timeout, allocated budget, remaining deadline)`;
//!    `effective == 0` → `Deferred`
//! 3. Stamp `effective` into the lane's context, spawn the lane as its own
//!    task, await it under `effective`
//! 4. Success → `Completed`; timeout → `Timeout` (task aborted);
//!    error or panic → `Failed`
//! 5. Feed the outcome to the breaker, return unused budget to the slack pool
//!
//! The effective timeout is fixed at dispatch and never re-checked mid-flight.
//! Lane errors and panics never cross this boundary.

use crate::lanes::RegisteredLane;
use crate::supervisor::CircuitBreakerRegistry;
use chrono::Utc;
use fanout_shared::{DeadlineTracker, LaneResult, SharedContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Executes lanes under the timeout/cancellation/breaker discipline
#[derive(Debug, Clone)]
pub struct LaneRunner {
    breakers: Arc<CircuitBreakerRegistry>,
    /// Prefix for breaker keys (`fusion.` for fusion sub-lanes)
    breaker_prefix: String,
}

impl LaneRunner {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            breakers,
            breaker_prefix: String::new(),
        }
    }

    /// Runner whose breaker entries are namespaced `<prefix><lane>`
    pub fn with_breaker_prefix(breakers: Arc<CircuitBreakerRegistry>, prefix: &str) -> Self {
        Self {
            breakers,
            breaker_prefix: prefix.to_string(),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Breaker key used for a lane
    pub fn breaker_key(&self, lane: &str) -> String {
        format!("{}{}", self.breaker_prefix, lane)
    }

    /// Effective timeout for a lane dispatched now
    pub fn effective_timeout_ms(
        lane: &RegisteredLane,
        allocated_ms: u64,
        tracker: &DeadlineTracker,
    ) -> u64 {
        lane.config
            .timeout_ms
            .min(allocated_ms)
            .min(tracker.remaining())
    }

    /// Run one lane to a terminal [`LaneResult`].
    pub async fn run(
        &self,
        lane: &RegisteredLane,
        query: &str,
        ctx: Arc<SharedContext>,
        allocated_ms: u64,
        tracker: &DeadlineTracker,
    ) -> LaneResult {
        let config = &lane.config;
        let breaker_key = self.breaker_key(&config.name);

        if self.breakers.should_skip(&breaker_key).await {
            debug!(lane = %config.name, "circuit open, skipping lane");
            tracker.add_to_slack_pool(allocated_ms);
            return LaneResult::skipped(config, allocated_ms, "circuit breaker open");
        }

        let effective_ms = Self::effective_timeout_ms(lane, allocated_ms, tracker);
        if effective_ms == 0 {
            debug!(lane = %config.name, allocated_ms, "no time left, deferring lane");
            return LaneResult::deferred(config, allocated_ms, "deadline exhausted before dispatch");
        }

        debug!(
            lane = %config.name,
            allocated_ms,
            effective_ms,
            remaining_ms = tracker.remaining(),
            "dispatching lane"
        );

        let started_at = Utc::now();
        let start = Instant::now();

        let lane_impl = Arc::clone(&lane.lane);
        let owned_query = query.to_string();
        let mut ctx = Arc::unwrap_or_clone(ctx);
        ctx.set_timeout_ms(effective_ms);
        let mut task = AbortOnDrop(tokio::spawn(async move {
            lane_impl.run(&owned_query, &ctx).await
        }));

        let outcome =
            tokio::time::timeout(Duration::from_millis(effective_ms), &mut task.0).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(Ok(payload))) => {
                tracker.record_first_result();
                LaneResult::completed(config, allocated_ms, effective_ms, started_at, elapsed_ms, payload)
            }
            Ok(Ok(Err(e))) => {
                warn!(lane = %config.name, elapsed_ms, error = %e, "lane failed");
                LaneResult::failed(config, allocated_ms, effective_ms, started_at, elapsed_ms, e.to_string())
            }
            Ok(Err(join_err)) => {
                let msg = if join_err.is_panic() {
                    "lane panicked".to_string()
                } else {
                    format!("lane task aborted: {}", join_err)
                };
                warn!(lane = %config.name, elapsed_ms, error = %msg, "lane failed");
                LaneResult::failed(config, allocated_ms, effective_ms, started_at, elapsed_ms, msg)
            }
            Err(_) => {
                task.0.abort();
                warn!(lane = %config.name, effective_ms, "lane timed out");
                LaneResult::timed_out(
                    config,
                    allocated_ms,
                    effective_ms,
                    started_at,
                    &format!("timed out after {}ms", effective_ms),
                )
            }
        };

        self.breakers.record_outcome(&breaker_key, result.status).await;
        tracker.add_to_slack_pool(result.unused_budget_ms());
        result
    }
}

/// Aborts the lane task when the runner future itself is dropped
/// (e.g. the orchestrator aborting outstanding lanes at the global deadline).
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
