//! Deadline-aware multi-lane orchestrator.
//!
//! ## Flow
//!
//! 1. Validate the query (before any tracking starts)
//! 2. Start the deadline tracker, classify intent, look up budgets
//! 3. Skip zero-budget lanes, defer lanes that cannot be allocated, dispatch
//!    the rest concurrently through the lane runner
//! 4. Join, bounded by the remaining deadline plus a small grace; outstanding
//!    lanes are aborted and recorded as `Timeout`
//! 5. Write completed payloads into the shared context
//! 6. Dispatch synthesis with `min(table budget, remaining - reserve)`
//! 7. Aggregate success / SLA / summary, record metrics
//!
//! ## Invariants
//!
//! - Lane failures never surface as `Err`; only validation does
//! - No lane runs longer than its effective timeout plus the join grace
//! - Synthesis is dispatched only after the data-lane join

use crate::config::Config;
use crate::lanes::{LaneRegistry, RegisteredLane};
use crate::metrics::{HealthView, MetricsSnapshot, OrchestrationMetrics};
use crate::runner::LaneRunner;
use crate::supervisor::CircuitBreakerRegistry;
use fanout_shared::{
    all_lanes_failed, classify, evaluate_success, names, BudgetTable, DeadlineTracker, LanePayload,
    LaneResult, LaneSummary, Mode, OrchestrateOptions, OrchestrationError, OrchestrationResponse,
    QueryIntent, SharedContext, SlaCompliance,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error text for a query where nothing completed
pub const ALL_LANES_FAILED: &str = "all lanes failed";

/// Multi-lane orchestrator. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<Config>,
    registry: LaneRegistry,
    budget_table: BudgetTable,
    breakers: Arc<CircuitBreakerRegistry>,
    runner: LaneRunner,
    metrics: Arc<OrchestrationMetrics>,
}

impl Orchestrator {
    /// Build with the standard budget table and breakers from `config`.
    pub fn new(
        config: Arc<Config>,
        registry: LaneRegistry,
        metrics: Arc<OrchestrationMetrics>,
    ) -> Result<Self, OrchestrationError> {
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.cooldown(),
        ));
        Self::with_parts(config, registry, BudgetTable::standard(), breakers, metrics)
    }

    /// Build from explicit parts. Use this when lanes (e.g. the fusion lane)
    /// must share the orchestrator's breaker registry.
    pub fn with_parts(
        config: Arc<Config>,
        registry: LaneRegistry,
        budget_table: BudgetTable,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<OrchestrationMetrics>,
    ) -> Result<Self, OrchestrationError> {
        config.validate()?;
        let missing: Vec<String> = registry
            .enabled()
            .into_iter()
            .filter(|l| !budget_table.contains(l.name()))
            .map(|l| l.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(OrchestrationError::Config(format!(
                "enabled lanes without a budget entry: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            runner: LaneRunner::new(Arc::clone(&breakers)),
            config,
            registry,
            budget_table,
            breakers,
            metrics,
        })
    }

    /// Replace the budget table, re-checking every enabled lane has an entry
    pub fn with_budget_table(self, budget_table: BudgetTable) -> Result<Self, OrchestrationError> {
        Self::with_parts(self.config, self.registry, budget_table, self.breakers, self.metrics)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LaneRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn metrics(&self) -> &Arc<OrchestrationMetrics> {
        &self.metrics
    }

    /// Answer one query under the global deadline.
    pub async fn orchestrate(
        &self,
        query: &str,
        options: OrchestrateOptions,
    ) -> Result<OrchestrationResponse, OrchestrationError> {
        let query = self.validate_query(query)?;
        let mode = options.mode.unwrap_or(self.config.orchestrator.mode);

        let tracker = Arc::new(DeadlineTracker::start(self.config.deadline_spec()));
        let intent = classify(query);
        let budgets = self.budget_table.budgets(intent, mode);
        debug!(%intent, %mode, ?budgets, "query classified");

        let mut lanes = self.run_data_lanes(query, &budgets, &tracker).await;

        let mut ctx = SharedContext::new();
        for lane in self.registry.data_lanes() {
            if let Some(payload) = lanes.get(lane.name()).and_then(completed_payload) {
                ctx.insert(lane.name(), payload.clone());
            }
        }

        let mut synthesis_done_ms = None;
        if let Some(synthesis) = self.registry.synthesis() {
            let result = self.run_synthesis(synthesis, query, ctx, &budgets, &tracker).await;
            if result.is_completed() {
                synthesis_done_ms = Some(tracker.elapsed_ms());
            }
            lanes.insert(result.lane.clone(), result);
        }

        let response = self.aggregate(query, intent, mode, budgets, lanes, &tracker, synthesis_done_ms);
        self.metrics.record(&response);

        info!(
            query_id = %response.query_id,
            %intent,
            %mode,
            success = response.success,
            total_time_ms = response.total_time_ms,
            completed = response.summary.successful_lanes + response.summary.partial_lanes,
            failed = response.summary.failed_lanes,
            skipped = response.summary.skipped_lanes,
            deferred = response.summary.deferred_lanes,
            slack_pool_ms = response.sla_compliance.slack_pool_ms,
            "query orchestrated"
        );
        Ok(response)
    }

    fn validate_query<'q>(&self, query: &'q str) -> Result<&'q str, OrchestrationError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(OrchestrationError::Validation("query must not be empty".to_string()));
        }
        let max = self.config.orchestrator.max_query_chars;
        let chars = trimmed.chars().count();
        if chars > max {
            return Err(OrchestrationError::Validation(format!(
                "query is {} characters, limit is {}",
                chars, max
            )));
        }
        Ok(trimmed)
    }

    // ========================================================================
    // Data lanes
    // ========================================================================

    async fn run_data_lanes(
        &self,
        query: &str,
        budgets: &BTreeMap<String, u64>,
        tracker: &Arc<DeadlineTracker>,
    ) -> BTreeMap<String, LaneResult> {
        let mut results: BTreeMap<String, LaneResult> = BTreeMap::new();
        let mut dispatched: Vec<(RegisteredLane, u64)> = Vec::new();
        let empty_ctx = Arc::new(SharedContext::new());
        let mut set = JoinSet::new();

        for lane in self.registry.data_lanes() {
            let budget = budgets.get(lane.name()).copied().unwrap_or(0);
            if budget == 0 {
                debug!(lane = %lane.name(), "no budget for intent, skipping");
                results.insert(
                    lane.name().to_string(),
                    LaneResult::skipped(&lane.config, 0, "no budget for intent"),
                );
                continue;
            }
            if !tracker.can_allocate(budget) {
                debug!(lane = %lane.name(), budget, remaining_ms = tracker.remaining(), "cannot allocate, deferring");
                results.insert(
                    lane.name().to_string(),
                    LaneResult::deferred(&lane.config, budget, "insufficient time before deadline"),
                );
                continue;
            }

            let runner = self.runner.clone();
            let owned = lane.clone();
            let tracker = Arc::clone(tracker);
            let ctx = Arc::clone(&empty_ctx);
            let query = query.to_string();
            set.spawn(async move { runner.run(&owned, &query, ctx, budget, &tracker).await });
            dispatched.push((lane.clone(), budget));
        }

        let join_deadline = Instant::now()
            + Duration::from_millis(tracker.remaining() + self.config.orchestrator.join_grace_ms);
        let mut expired = false;
        loop {
            match tokio::time::timeout_at(join_deadline, set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    results.insert(result.lane.clone(), result);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "lane task ended abnormally"),
                Ok(None) => break,
                Err(_) => {
                    expired = true;
                    set.abort_all();
                    break;
                }
            }
        }

        for (lane, budget) in dispatched {
            if results.contains_key(lane.name()) {
                continue;
            }
            let effective = lane.config.timeout_ms.min(budget);
            let result = if expired {
                warn!(lane = %lane.name(), "lane outstanding at deadline, aborted");
                LaneResult::timed_out(
                    &lane.config,
                    budget,
                    effective,
                    chrono::Utc::now(),
                    "aborted at global deadline",
                )
            } else {
                LaneResult::failed(
                    &lane.config,
                    budget,
                    effective,
                    chrono::Utc::now(),
                    0,
                    "lane task ended abnormally".to_string(),
                )
            };
            self.breakers
                .record_outcome(&self.runner.breaker_key(lane.name()), result.status)
                .await;
            results.insert(lane.name().to_string(), result);
        }

        results
    }

    // ========================================================================
    // Synthesis
    // ========================================================================

    async fn run_synthesis(
        &self,
        synthesis: &RegisteredLane,
        query: &str,
        ctx: SharedContext,
        budgets: &BTreeMap<String, u64>,
        tracker: &DeadlineTracker,
    ) -> LaneResult {
        let table_budget = budgets.get(names::SYNTHESIS).copied().unwrap_or(0);
        if table_budget == 0 {
            return LaneResult::skipped(&synthesis.config, 0, "no budget for intent");
        }

        let allocated = table_budget.min(tracker.allocatable());
        if allocated == 0 {
            warn!(remaining_ms = tracker.remaining(), "no time left for synthesis, deferring");
            return LaneResult::deferred(&synthesis.config, table_budget, "deadline exhausted before synthesis");
        }

        debug!(allocated, context_lanes = ctx.len(), "dispatching synthesis");
        self.runner
            .run(synthesis, query, Arc::new(ctx), allocated, tracker)
            .await
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn aggregate(
        &self,
        query: &str,
        intent: QueryIntent,
        mode: Mode,
        budgets: BTreeMap<String, u64>,
        lanes: BTreeMap<String, LaneResult>,
        tracker: &DeadlineTracker,
        synthesis_done_ms: Option<u64>,
    ) -> OrchestrationResponse {
        let orchestrator = &self.config.orchestrator;
        let policy = self.config.success_policy();
        let total_time_ms = tracker.elapsed_ms();

        let success = evaluate_success(&policy, lanes.values());
        let summary = LaneSummary::from_results(lanes.values());

        let final_answer = lanes
            .get(names::SYNTHESIS)
            .and_then(completed_payload)
            .cloned();

        let partial_results = orchestrator.return_partial_results.then(|| {
            lanes
                .iter()
                .filter_map(|(name, r)| completed_payload(r).map(|p| (name.clone(), p.clone())))
                .collect::<BTreeMap<String, LanePayload>>()
        });

        let error = if all_lanes_failed(lanes.values()) {
            Some(ALL_LANES_FAILED.to_string())
        } else if !success {
            Some(failure_reason(&lanes))
        } else {
            None
        };

        let ttft_ms = synthesis_done_ms.or_else(|| tracker.first_result_ms());
        let deadline_ms = tracker.global_deadline_ms();
        let sla_compliance = SlaCompliance {
            deadline_ms,
            elapsed_ms: total_time_ms,
            ttft_target_ms: tracker.ttft_target_ms(),
            ttft_ms,
            ttft_within_target: ttft_ms.is_some_and(|t| t <= tracker.ttft_target_ms()),
            answered_under_sla: final_answer.is_some() && total_time_ms <= deadline_ms,
            deadline_remaining_ms: tracker.remaining(),
            slack_pool_ms: tracker.slack_pool_ms(),
        };

        OrchestrationResponse {
            query_id: Uuid::new_v4(),
            query: query.to_string(),
            intent,
            mode,
            budgets,
            sla_compliance,
            success,
            total_time_ms,
            within_budget: total_time_ms <= orchestrator.max_total_time_ms,
            lanes,
            summary,
            final_answer,
            partial_results,
            error,
        }
    }

    // ========================================================================
    // Health / metrics
    // ========================================================================

    /// Health view over the metrics and breaker registry
    pub async fn health(&self) -> HealthView {
        let open_circuits = self.breakers.open_lanes().await;
        HealthView {
            status: if open_circuits.is_empty() { "healthy" } else { "degraded" }.to_string(),
            enabled_lanes: self.registry.enabled_names(),
            overall_success_rate: self.metrics.overall_success_rate(),
            open_circuits,
            total_queries: self.metrics.total_queries(),
        }
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(&self.breakers).await
    }
}

fn completed_payload(result: &LaneResult) -> Option<&LanePayload> {
    if result.is_completed() {
        result.payload.as_ref()
    } else {
        None
    }
}

fn failure_reason(lanes: &BTreeMap<String, LaneResult>) -> String {
    let missing: Vec<&str> = lanes
        .values()
        .filter(|r| r.required && !r.is_completed())
        .map(|r| r.lane.as_str())
        .collect();
    if missing.is_empty() {
        "no lane completed".to_string()
    } else {
        format!("required lanes did not complete: {}", missing.join(", "))
    }
}
