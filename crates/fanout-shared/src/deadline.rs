//! Global deadline tracking for a single query.
//!
//! One tracker is created at query start and shared (behind an `Arc`) by every
//! lane invocation of that query. The only state lanes mutate concurrently is
//! the slack pool, an append-only atomic counter.
//!
//! Uses the tokio clock so paused-time tests are deterministic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const NO_FIRST_RESULT: u64 = u64::MAX;

/// Deadline parameters for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineSpec {
    /// Hard wall-clock deadline for the whole query
    pub global_deadline_ms: u64,
    /// Time kept back for aggregation after the last lane
    pub orchestrator_reserve_ms: u64,
    /// Target for the first useful output
    pub ttft_target_ms: u64,
}

impl Default for DeadlineSpec {
    fn default() -> Self {
        Self {
            global_deadline_ms: 12_000,
            orchestrator_reserve_ms: 500,
            ttft_target_ms: 3_000,
        }
    }
}

/// Per-query deadline tracker.
#[derive(Debug)]
pub struct DeadlineTracker {
    query_start: Instant,
    spec: DeadlineSpec,
    slack_pool_ms: AtomicU64,
    first_result_ms: AtomicU64,
}

impl DeadlineTracker {
    /// Start tracking now.
    pub fn start(spec: DeadlineSpec) -> Self {
        Self::start_at(spec, Instant::now())
    }

    /// Start tracking from an explicit instant.
    pub fn start_at(spec: DeadlineSpec, query_start: Instant) -> Self {
        Self {
            query_start,
            spec,
            slack_pool_ms: AtomicU64::new(0),
            first_result_ms: AtomicU64::new(NO_FIRST_RESULT),
        }
    }

    pub fn spec(&self) -> &DeadlineSpec {
        &self.spec
    }

    pub fn global_deadline_ms(&self) -> u64 {
        self.spec.global_deadline_ms
    }

    pub fn orchestrator_reserve_ms(&self) -> u64 {
        self.spec.orchestrator_reserve_ms
    }

    pub fn ttft_target_ms(&self) -> u64 {
        self.spec.ttft_target_ms
    }

    pub fn elapsed(&self) -> Duration {
        self.query_start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Milliseconds left before the global deadline, floored at 0.
    pub fn remaining(&self) -> u64 {
        self.spec.global_deadline_ms.saturating_sub(self.elapsed_ms())
    }

    /// Time left once the orchestrator reserve is held back.
    pub fn allocatable(&self) -> u64 {
        self.remaining()
            .saturating_sub(self.spec.orchestrator_reserve_ms)
    }

    /// Whether a lane asking for `requested_ms` can still finish before the
    /// reserve-protected deadline.
    pub fn can_allocate(&self, requested_ms: u64) -> bool {
        self.remaining() >= requested_ms.saturating_add(self.spec.orchestrator_reserve_ms)
    }

    /// Whether the global deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining() == 0
    }

    /// Return unused budget to the slack pool. Telemetry only.
    pub fn add_to_slack_pool(&self, unused_ms: u64) {
        if unused_ms > 0 {
            self.slack_pool_ms.fetch_add(unused_ms, Ordering::Relaxed);
        }
    }

    pub fn slack_pool_ms(&self) -> u64 {
        self.slack_pool_ms.load(Ordering::Relaxed)
    }

    /// Stamp the elapsed time of the first completed lane. Later calls are no-ops.
    pub fn record_first_result(&self) {
        let now = self.elapsed_ms();
        let _ = self.first_result_ms.compare_exchange(
            NO_FIRST_RESULT,
            now,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn first_result_ms(&self) -> Option<u64> {
        match self.first_result_ms.load(Ordering::Acquire) {
            NO_FIRST_RESULT => None,
            ms => Some(ms),
        }
    }
}
