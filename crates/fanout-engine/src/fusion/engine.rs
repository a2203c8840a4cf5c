//! Index-fabric fusion engine.
//!
//! Runs ranked sub-lanes concurrently through the shared [`LaneRunner`] under
//! one sub-budget, then merges their lists with RRF.
//!
//! ## Flow
//!
//! 1. Start a sub-budget tracker (no reserve). The sub-budget is
//!    `fusion.budget_ms`, shrunk to fit inside the fusion lane's own
//!    effective timeout when one is stamped on the context
//! 2. Dispatch every enabled sub-lane into a `JoinSet`
//! 3. Join, bounded by the sub-budget; stragglers are aborted and recorded
//!    as `Timeout`
//! 4. Truncate each completed list, fuse (or concatenate), truncate again
//!
//! All sub-lanes failing is not an error: the `FusedResult` carries an error
//! message and zero items.

use super::rrf::{self, RankedList};
use crate::config::FusionConfig;
use crate::lanes::{Lane, LaneRegistry, RegisteredLane};
use crate::runner::LaneRunner;
use crate::supervisor::CircuitBreakerRegistry;
use async_trait::async_trait;
use fanout_shared::{
    DeadlineSpec, DeadlineTracker, FusedResult, LaneConfig, LaneError, LanePayload, LaneResult,
    RankedItem, SharedContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker namespace for sub-lanes
pub const BREAKER_PREFIX: &str = "fusion.";

/// Wait past the sub-budget before stragglers are aborted
const JOIN_GRACE: Duration = Duration::from_millis(20);

/// Kept free at the end of the fusion lane's timeout for the join grace and
/// the merge, so the runner never cancels fusion mid-merge
pub const MERGE_MARGIN_MS: u64 = 50;

/// Fusion engine over a fixed set of ranked sub-lanes
#[derive(Debug)]
pub struct FusionEngine {
    config: FusionConfig,
    sub_lanes: LaneRegistry,
    runner: LaneRunner,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            config,
            sub_lanes: LaneRegistry::new(),
            runner: LaneRunner::with_breaker_prefix(breakers, BREAKER_PREFIX),
        }
    }

    /// Register a sub-lane. Known names (`fulltext`, `vector_primary`,
    /// `vector_local`, `graph`) take their configured timeout, others the
    /// whole sub-budget. Merge order is registration order.
    pub fn with_sub_lane(mut self, name: &str, lane: Arc<dyn Lane>) -> Self {
        let timeout_ms = self
            .config
            .sub_lane_timeouts()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .unwrap_or(self.config.budget_ms);
        let priority = self.sub_lanes.len() as u32 + 1;
        self.sub_lanes
            .register(LaneConfig::new(name, timeout_ms).with_priority(priority), lane);
        self
    }

    /// Register a sub-lane with an explicit config
    pub fn register_sub_lane(&mut self, config: LaneConfig, lane: Arc<dyn Lane>) {
        self.sub_lanes.register(config, lane);
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn sub_lane_names(&self) -> Vec<String> {
        self.sub_lanes.enabled_names()
    }

    /// Sub-budget for one run: the configured budget, capped by the
    /// caller's effective timeout less [`MERGE_MARGIN_MS`].
    pub fn sub_budget_ms(&self, ctx: &SharedContext) -> u64 {
        match ctx.timeout_ms() {
            Some(outer) => self.config.budget_ms.min(outer.saturating_sub(MERGE_MARGIN_MS)),
            None => self.config.budget_ms,
        }
    }

    /// Run all sub-lanes and merge their results.
    pub async fn fuse(&self, query: &str, ctx: Arc<SharedContext>) -> FusedResult {
        let budget_ms = self.sub_budget_ms(&ctx);
        let tracker = Arc::new(DeadlineTracker::start(DeadlineSpec {
            global_deadline_ms: budget_ms,
            orchestrator_reserve_ms: 0,
            ttft_target_ms: budget_ms,
        }));
        let sub_lanes: Vec<RegisteredLane> = self.sub_lanes.enabled().into_iter().cloned().collect();

        if sub_lanes.is_empty() {
            return empty_result(query, BTreeMap::new(), &tracker, "no fusion sub-lanes registered");
        }

        // ====================================================================
        // Dispatch
        // ====================================================================

        let mut set = JoinSet::new();
        for lane in &sub_lanes {
            let runner = self.runner.clone();
            let lane = lane.clone();
            let tracker = Arc::clone(&tracker);
            let ctx = Arc::clone(&ctx);
            let query = query.to_string();
            set.spawn(async move { runner.run(&lane, &query, ctx, budget_ms, &tracker).await });
        }

        // ====================================================================
        // Join under the sub-budget
        // ====================================================================

        let mut lane_results: BTreeMap<String, LaneResult> = BTreeMap::new();
        let join_deadline = Instant::now() + Duration::from_millis(tracker.remaining()) + JOIN_GRACE;
        loop {
            match tokio::time::timeout_at(join_deadline, set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    lane_results.insert(result.lane.clone(), result);
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "fusion sub-lane task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    set.abort_all();
                    break;
                }
            }
        }

        for lane in &sub_lanes {
            if !lane_results.contains_key(lane.name()) {
                let key = self.runner.breaker_key(lane.name());
                warn!(sub_lane = %lane.name(), "fusion sub-lane outstanding at sub-budget, aborted");
                self.runner.breakers().record_failure(&key).await;
                lane_results.insert(
                    lane.name().to_string(),
                    LaneResult::timed_out(
                        &lane.config,
                        budget_ms,
                        lane.config.timeout_ms.min(budget_ms),
                        chrono::Utc::now(),
                        "aborted at fusion sub-budget",
                    ),
                );
            }
        }

        // ====================================================================
        // Merge
        // ====================================================================

        let successful_lanes = lane_results.values().filter(|r| r.is_completed()).count();
        let failed_lanes = sub_lanes.len() - successful_lanes;
        if successful_lanes == 0 {
            warn!(sub_lanes = sub_lanes.len(), "all fusion sub-lanes failed");
            return empty_result(query, lane_results, &tracker, "all fusion sub-lanes failed");
        }

        let fusion_start = Instant::now();
        let items = {
            let lists: Vec<RankedList<'_>> = sub_lanes
                .iter()
                .filter_map(|lane| {
                    let result = lane_results.get(lane.name())?;
                    let payload = result.payload.as_ref()?;
                    Some(RankedList {
                        lane: lane.name(),
                        items: &payload.items,
                    })
                })
                .collect();

            let max_per_list = self.config.max_results_per_lane;
            let max_results = self.config.max_fused_results;
            if self.config.rrf_enabled {
                rrf::fuse(&lists, self.config.rrf_k, max_per_list, max_results)
            } else {
                rrf::concat(&lists, max_per_list, max_results)
            }
        };
        let fusion_time_ms = fusion_start.elapsed().as_millis() as u64;
        let total_time_ms = tracker.elapsed_ms();

        debug!(
            fused = items.len(),
            successful_lanes,
            failed_lanes,
            total_time_ms,
            "fusion complete"
        );

        FusedResult {
            query: query.to_string(),
            items,
            lane_results,
            fusion_time_ms,
            total_time_ms,
            within_budget: total_time_ms <= budget_ms,
            successful_lanes,
            failed_lanes,
            error: None,
        }
    }

}

fn empty_result(
    query: &str,
    lane_results: BTreeMap<String, LaneResult>,
    tracker: &DeadlineTracker,
    error: &str,
) -> FusedResult {
    let total_time_ms = tracker.elapsed_ms();
    FusedResult {
        query: query.to_string(),
        items: Vec::new(),
        failed_lanes: lane_results.len(),
        lane_results,
        fusion_time_ms: 0,
        total_time_ms,
        within_budget: total_time_ms <= tracker.global_deadline_ms(),
        successful_lanes: 0,
        error: Some(error.to_string()),
    }
}

// ============================================================================
// Lane adapter
// ============================================================================

/// Exposes a [`FusionEngine`] as one orchestrator lane
#[derive(Debug, Clone)]
pub struct FusionLane {
    engine: Arc<FusionEngine>,
}

impl FusionLane {
    pub fn new(engine: Arc<FusionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Lane for FusionLane {
    async fn run(&self, query: &str, ctx: &SharedContext) -> Result<LanePayload, LaneError> {
        let fused = self.engine.fuse(query, Arc::new(ctx.clone())).await;
        if let Some(error) = fused.error.as_deref() {
            return Err(LaneError::Failed(error.to_string()));
        }

        let summary = fused.summary();
        let partial = fused.failed_lanes > 0;
        let items: Vec<RankedItem> = fused
            .items
            .into_iter()
            .map(|f| {
                let mut item = f.item;
                item.score = f.fused_score;
                item.metadata
                    .insert("fusion_key".to_string(), serde_json::Value::String(f.key));
                item.metadata.insert(
                    "contributing_lanes".to_string(),
                    serde_json::json!(f.contributing_lanes),
                );
                item
            })
            .collect();

        let payload = LanePayload::items(items).with_metadata(summary);
        Ok(if partial { payload.mark_partial() } else { payload })
    }
}
