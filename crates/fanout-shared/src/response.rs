//! Orchestration response and the pure aggregation rules behind it.

use crate::budget::Mode;
use crate::intent::QueryIntent;
use crate::lane::{LanePayload, LaneResult, LaneStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrateOptions {
    /// Overrides the configured mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl OrchestrateOptions {
    pub fn with_mode(mode: Mode) -> Self {
        Self { mode: Some(mode) }
    }
}

// ============================================================================
// Success policy
// ============================================================================

/// How lane outcomes fold into the overall `success` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPolicy {
    /// Success needs at least one completed lane (data or synthesis)
    pub require_at_least_one_lane: bool,
    /// Surface completed payloads even when the query as a whole failed
    pub return_partial_results: bool,
    /// A required lane that did not complete always fails the query,
    /// regardless of `return_partial_results`
    pub strict_required_lanes: bool,
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        Self {
            require_at_least_one_lane: true,
            return_partial_results: true,
            strict_required_lanes: false,
        }
    }
}

/// Pure function: overall success for a finished query.
pub fn evaluate_success<'a>(
    policy: &SuccessPolicy,
    results: impl IntoIterator<Item = &'a LaneResult>,
) -> bool {
    let mut any_completed = false;
    let mut dispatched = 0usize;
    let mut failed = 0usize;
    let mut required_missing = false;

    for r in results {
        if r.is_completed() {
            any_completed = true;
        }
        if r.status.was_dispatched() {
            dispatched += 1;
        }
        if r.status.is_failure() {
            failed += 1;
        }
        if r.required && !r.is_completed() {
            required_missing = true;
        }
    }

    let base = if policy.require_at_least_one_lane {
        any_completed
    } else {
        !(dispatched > 0 && failed == dispatched)
    };

    let required_blocks =
        required_missing && (policy.strict_required_lanes || !policy.return_partial_results);

    base && !required_blocks
}

/// True when nothing completed and at least one lane failed.
pub fn all_lanes_failed<'a>(results: impl IntoIterator<Item = &'a LaneResult>) -> bool {
    let mut any_failed = false;
    for r in results {
        if r.is_completed() {
            return false;
        }
        any_failed |= r.status.is_failure();
    }
    any_failed
}

// ============================================================================
// Summary
// ============================================================================

/// Lane outcome counts for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSummary {
    /// Completed with a full payload
    pub successful_lanes: usize,
    /// Completed with a lane-declared partial payload
    pub partial_lanes: usize,
    /// Failed or timed out
    pub failed_lanes: usize,
    pub skipped_lanes: usize,
    pub deferred_lanes: usize,
    pub total_lanes: usize,
}

impl LaneSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a LaneResult>) -> Self {
        let mut summary = Self::default();
        for r in results {
            summary.total_lanes += 1;
            match r.status {
                LaneStatus::Completed if r.is_partial() => summary.partial_lanes += 1,
                LaneStatus::Completed => summary.successful_lanes += 1,
                LaneStatus::Failed | LaneStatus::Timeout => summary.failed_lanes += 1,
                LaneStatus::Skipped => summary.skipped_lanes += 1,
                LaneStatus::Deferred | LaneStatus::Pending | LaneStatus::Running => {
                    summary.deferred_lanes += 1
                }
            }
        }
        summary
    }
}

// ============================================================================
// SLA
// ============================================================================

/// Deadline / latency compliance of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaCompliance {
    pub deadline_ms: u64,
    pub elapsed_ms: u64,
    pub ttft_target_ms: u64,
    /// Time to first token proxy: synthesis completion, else first data result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    pub ttft_within_target: bool,
    /// A final answer exists and arrived before the deadline
    pub answered_under_sla: bool,
    pub deadline_remaining_ms: u64,
    pub slack_pool_ms: u64,
}

// ============================================================================
// Response
// ============================================================================

/// Everything the caller gets back for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub query_id: Uuid,
    pub query: String,
    pub intent: QueryIntent,
    pub mode: Mode,
    /// Allocation per lane for this (intent, mode)
    pub budgets: BTreeMap<String, u64>,
    pub sla_compliance: SlaCompliance,
    pub success: bool,
    pub total_time_ms: u64,
    pub within_budget: bool,
    pub lanes: BTreeMap<String, LaneResult>,
    pub summary: LaneSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<LanePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<BTreeMap<String, LanePayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrchestrationResponse {
    pub fn lane(&self, name: &str) -> Option<&LaneResult> {
        self.lanes.get(name)
    }

    pub fn lane_status(&self, name: &str) -> Option<LaneStatus> {
        self.lanes.get(name).map(|r| r.status)
    }

    /// Lane results ordered by priority, then name.
    pub fn lanes_by_priority(&self) -> Vec<&LaneResult> {
        let mut lanes: Vec<&LaneResult> = self.lanes.values().collect();
        lanes.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.lane.cmp(&b.lane)));
        lanes
    }

    /// Answer text, if synthesis produced one.
    pub fn answer_text(&self) -> Option<&str> {
        self.final_answer.as_ref().and_then(|p| p.answer.as_deref())
    }
}
