//! Process-wide orchestration metrics.
//!
//! One [`OrchestrationMetrics`] is created at startup and injected into the
//! orchestrator. It keeps a mutex-guarded accumulator for the JSON snapshot /
//! health view and mirrors every outcome into a Prometheus registry.

use crate::supervisor::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
use fanout_shared::{LaneResult, LaneStatus, OrchestrationError, OrchestrationResponse};
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// Accumulator
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct LaneStats {
    success: u64,
    /// Completed with a partial payload (e.g. fusion with a failed sub-lane)
    partial: u64,
    failure: u64,
    timeout: u64,
    skipped: u64,
    deferred: u64,
    /// Sum of elapsed time over dispatched outcomes
    total_duration_ms: u64,
}

impl LaneStats {
    fn dispatched(&self) -> u64 {
        self.success + self.partial + self.failure + self.timeout
    }

    fn snapshot(&self, circuit_open: bool) -> LaneStatsSnapshot {
        let dispatched = self.dispatched();
        let (success_rate, avg_duration_ms) = if dispatched == 0 {
            (0.0, 0.0)
        } else {
            (
                (self.success + self.partial) as f64 / dispatched as f64,
                self.total_duration_ms as f64 / dispatched as f64,
            )
        };
        LaneStatsSnapshot {
            success: self.success,
            partial: self.partial,
            failure: self.failure,
            timeout: self.timeout,
            skipped: self.skipped,
            deferred: self.deferred,
            success_rate,
            avg_duration_ms,
            circuit_open,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    total_queries: u64,
    successful_queries: u64,
    lanes: BTreeMap<String, LaneStats>,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Per-lane counters at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneStatsSnapshot {
    pub success: u64,
    pub partial: u64,
    pub failure: u64,
    pub timeout: u64,
    pub skipped: u64,
    pub deferred: u64,
    /// (success + partial) / (success + partial + failure + timeout)
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub circuit_open: bool,
}

/// Full metrics view (`GET /v1/metrics`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub overall_success_rate: f64,
    pub lanes: BTreeMap<String, LaneStatsSnapshot>,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
}

/// Health view (`GET /v1/health`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthView {
    /// "healthy" when no breaker is open, else "degraded"
    pub status: String,
    pub enabled_lanes: Vec<String>,
    pub overall_success_rate: f64,
    pub open_circuits: Vec<String>,
    pub total_queries: u64,
}

impl HealthView {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Orchestration metrics: JSON accumulator plus Prometheus export
pub struct OrchestrationMetrics {
    inner: Mutex<Accumulator>,
    lane_outcomes_total: IntCounterVec,
    lane_duration_seconds: HistogramVec,
    queries_total: IntCounterVec,
    slack_pool_ms: IntGauge,
    registry: Registry,
}

impl std::fmt::Debug for OrchestrationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationMetrics").finish_non_exhaustive()
    }
}

impl OrchestrationMetrics {
    pub fn new() -> Result<Self, OrchestrationError> {
        let registry = Registry::new();

        let lane_outcomes_total = register_int_counter_vec_with_registry!(
            "fanout_lane_outcomes_total",
            "Lane outcomes by lane and status",
            &["lane", "status"],
            registry
        )
        .map_err(prometheus_error)?;

        let lane_duration_seconds = register_histogram_vec_with_registry!(
            "fanout_lane_duration_seconds",
            "Elapsed time of dispatched lanes in seconds",
            &["lane"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0],
            registry
        )
        .map_err(prometheus_error)?;

        let queries_total = register_int_counter_vec_with_registry!(
            "fanout_queries_total",
            "Orchestrated queries by result",
            &["result"],
            registry
        )
        .map_err(prometheus_error)?;

        let slack_pool_ms = register_int_gauge_with_registry!(
            "fanout_slack_pool_ms",
            "Slack pool of the most recent query in milliseconds",
            registry
        )
        .map_err(prometheus_error)?;

        Ok(Self {
            inner: Mutex::new(Accumulator::default()),
            lane_outcomes_total,
            lane_duration_seconds,
            queries_total,
            slack_pool_ms,
            registry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        // A panic mid-update leaves counters that are still meaningful
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fold one finished query into the counters
    pub fn record(&self, response: &OrchestrationResponse) {
        {
            let mut acc = self.lock();
            acc.total_queries += 1;
            if response.success {
                acc.successful_queries += 1;
            }
            for (name, result) in &response.lanes {
                let stats = acc.lanes.entry(name.clone()).or_default();
                match result.status {
                    LaneStatus::Completed if result.is_partial() => stats.partial += 1,
                    LaneStatus::Completed => stats.success += 1,
                    LaneStatus::Failed => stats.failure += 1,
                    LaneStatus::Timeout => stats.timeout += 1,
                    LaneStatus::Skipped => stats.skipped += 1,
                    LaneStatus::Deferred => stats.deferred += 1,
                    LaneStatus::Pending | LaneStatus::Running => {}
                }
                if result.status.was_dispatched() {
                    stats.total_duration_ms += result.elapsed_ms;
                }
            }
        }

        for (name, result) in &response.lanes {
            self.lane_outcomes_total
                .with_label_values(&[name.as_str(), outcome_label(result)])
                .inc();
            if result.status.was_dispatched() {
                self.lane_duration_seconds
                    .with_label_values(&[name.as_str()])
                    .observe(result.elapsed_ms as f64 / 1_000.0);
            }
        }
        let outcome = if response.success { "success" } else { "failure" };
        self.queries_total.with_label_values(&[outcome]).inc();
        self.slack_pool_ms
            .set(response.sla_compliance.slack_pool_ms.min(i64::MAX as u64) as i64);
    }

    pub fn total_queries(&self) -> u64 {
        self.lock().total_queries
    }

    /// Overall success rate, 0.0 before the first query
    pub fn overall_success_rate(&self) -> f64 {
        let acc = self.lock();
        success_rate(acc.successful_queries, acc.total_queries)
    }

    /// Counters plus the current breaker states
    pub async fn snapshot(&self, breakers: &CircuitBreakerRegistry) -> MetricsSnapshot {
        let circuit_breakers = breakers.snapshot().await;
        let acc = self.lock();
        let lanes = acc
            .lanes
            .iter()
            .map(|(name, stats)| {
                let open = circuit_breakers
                    .get(name)
                    .is_some_and(|b| b.state == CircuitState::Open);
                (name.clone(), stats.snapshot(open))
            })
            .collect();

        MetricsSnapshot {
            total_queries: acc.total_queries,
            successful_queries: acc.successful_queries,
            overall_success_rate: success_rate(acc.successful_queries, acc.total_queries),
            lanes,
            circuit_breakers,
        }
    }

    /// Prometheus text exposition
    pub fn render_prometheus(&self) -> Result<String, OrchestrationError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(prometheus_error)?;
        String::from_utf8(buffer).map_err(|e| OrchestrationError::Internal(e.to_string()))
    }
}

/// Prometheus `status` label: the lane status, with partial completions
/// split out as `partial`
fn outcome_label(result: &LaneResult) -> &'static str {
    if result.is_partial() {
        "partial"
    } else {
        result.status.as_str()
    }
}

fn success_rate(successes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    }
}

fn prometheus_error(e: prometheus::Error) -> OrchestrationError {
    OrchestrationError::Internal(format!("metrics registry: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fanout_shared::{LaneConfig, LanePayload, LaneSummary, Mode, QueryIntent, SlaCompliance};
    use std::time::Duration;

    fn response(success: bool, lanes: Vec<LaneResult>) -> OrchestrationResponse {
        let lanes: BTreeMap<String, LaneResult> =
            lanes.into_iter().map(|r| (r.lane.clone(), r)).collect();
        OrchestrationResponse {
            query_id: uuid::Uuid::new_v4(),
            query: "q".to_string(),
            intent: QueryIntent::Simple,
            mode: Mode::Standard,
            budgets: BTreeMap::new(),
            sla_compliance: SlaCompliance {
                deadline_ms: 12_000,
                elapsed_ms: 100,
                ttft_target_ms: 3_000,
                ttft_ms: Some(100),
                ttft_within_target: true,
                answered_under_sla: success,
                deadline_remaining_ms: 11_900,
                slack_pool_ms: 42,
            },
            success,
            total_time_ms: 100,
            within_budget: true,
            summary: LaneSummary::from_results(lanes.values()),
            lanes,
            final_answer: None,
            partial_results: None,
            error: None,
        }
    }

    fn completed(name: &str, elapsed_ms: u64) -> LaneResult {
        LaneResult::completed(
            &LaneConfig::new(name, 1_000),
            1_000,
            1_000,
            Utc::now(),
            elapsed_ms,
            LanePayload::default(),
        )
    }

    fn failed(name: &str) -> LaneResult {
        LaneResult::failed(&LaneConfig::new(name, 1_000), 1_000, 1_000, Utc::now(), 10, "boom".into())
    }

    #[test]
    fn test_record_accumulates() {
        let metrics = OrchestrationMetrics::new().unwrap();
        metrics.record(&response(true, vec![completed("web", 100), failed("vector")]));
        metrics.record(&response(false, vec![completed("web", 300)]));

        assert_eq!(metrics.total_queries(), 2);
        assert!((metrics.overall_success_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_snapshot_includes_breakers() {
        let metrics = OrchestrationMetrics::new().unwrap();
        let breakers = CircuitBreakerRegistry::new(1, Duration::from_secs(60));
        breakers.record_failure("vector").await;

        metrics.record(&response(true, vec![completed("web", 100), failed("vector")]));
        metrics.record(&response(true, vec![completed("web", 300)]));

        let snapshot = metrics.snapshot(&breakers).await;
        let web = &snapshot.lanes["web"];
        assert_eq!(web.success, 2);
        assert!((web.avg_duration_ms - 200.0).abs() < 1e-9);
        assert!((web.success_rate - 1.0).abs() < 1e-9);
        assert!(!web.circuit_open);
        assert!(snapshot.lanes["vector"].circuit_open);
        assert_eq!(snapshot.circuit_breakers.len(), 1);
    }

    #[test]
    fn test_render_prometheus() {
        let metrics = OrchestrationMetrics::new().unwrap();
        metrics.record(&response(true, vec![completed("web", 100)]));

        let text = metrics.render_prometheus().unwrap();
        assert!(text.contains("fanout_lane_outcomes_total{lane=\"web\",status=\"completed\"} 1"));
        assert!(text.contains("fanout_queries_total{result=\"success\"} 1"));
        assert!(text.contains("fanout_slack_pool_ms 42"));
        assert!(text.contains("fanout_lane_duration_seconds_bucket"));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = OrchestrationMetrics::new().unwrap();
        assert_eq!(metrics.total_queries(), 0);
        assert_eq!(metrics.overall_success_rate(), 0.0);
    }

    fn partial(name: &str, elapsed_ms: u64) -> LaneResult {
        LaneResult::completed(
            &LaneConfig::new(name, 1_000),
            1_000,
            1_000,
            Utc::now(),
            elapsed_ms,
            LanePayload::default().mark_partial(),
        )
    }

    #[tokio::test]
    async fn test_partial_completions_counted_separately() {
        let metrics = OrchestrationMetrics::new().unwrap();
        let breakers = CircuitBreakerRegistry::default();
        metrics.record(&response(true, vec![partial("fusion", 100)]));
        metrics.record(&response(true, vec![completed("fusion", 100)]));
        metrics.record(&response(true, vec![failed("fusion")]));

        let fusion = &metrics.snapshot(&breakers).await.lanes["fusion"];
        assert_eq!(fusion.success, 1);
        assert_eq!(fusion.partial, 1);
        assert_eq!(fusion.failure, 1);
        assert!((fusion.success_rate - 2.0 / 3.0).abs() < 1e-9);

        let text = metrics.render_prometheus().unwrap();
        assert!(text.contains("fanout_lane_outcomes_total{lane=\"fusion\",status=\"partial\"} 1"));
        assert!(text.contains("fanout_lane_outcomes_total{lane=\"fusion\",status=\"completed\"} 1"));
    }
}
