//! Lane configuration, payload and result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Built-in lane names.
pub mod names {
    /// Full-text / web search
    pub const WEB: &str = "web";
    pub const VECTOR: &str = "vector";
    pub const KNOWLEDGE_GRAPH: &str = "knowledge_graph";
    pub const VIDEO: &str = "video";
    /// Index fabric (RRF over the fusion sub-lanes)
    pub const FUSION: &str = "fusion";
    /// Final answer generation, dispatched after the data lanes
    pub const SYNTHESIS: &str = "synthesis";

    /// Data lanes in default dispatch order.
    pub const DATA_LANES: [&str; 5] = [WEB, VECTOR, KNOWLEDGE_GRAPH, VIDEO, FUSION];
}

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub name: String,
    pub enabled: bool,
    /// Declared timeout; the effective timeout is never larger than this
    pub timeout_ms: u64,
    /// Reporting tie-break only (lower first)
    pub priority: u32,
    /// Failure of a required lane can flip overall success
    pub required: bool,
}

impl LaneConfig {
    pub fn new(name: &str, timeout_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            timeout_ms,
            priority: 100,
            required: false,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle / outcome of a lane for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Pending,
    Running,
    /// Finished with a payload before its timeout
    Completed,
    /// Cancelled at its effective timeout
    Timeout,
    /// Lane returned an error or panicked
    Failed,
    /// Not invoked: breaker open, or no budget for this intent
    Skipped,
    /// Not invoked: the deadline tracker could not allocate its budget
    Deferred,
}

impl LaneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Deferred => "deferred",
        }
    }

    /// Counts against the lane's circuit breaker.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::Failed)
    }

    /// The lane function was actually invoked.
    pub fn was_dispatched(&self) -> bool {
        matches!(self, Self::Completed | Self::Timeout | Self::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Payload
// ============================================================================

/// One ranked hit returned by a search-style lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Source-reported identity, if the source has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Source-native relevance score (not comparable across sources)
    #[serde(default)]
    pub score: f64,
    /// Lane that produced the item
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RankedItem {
    pub fn new(id: &str, title: &str, source: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            title: title.to_string(),
            content: String::new(),
            score: 0.0,
            source: source.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    /// Item without a source id; fusion keys it by content hash.
    pub fn anonymous(title: &str, content: &str, source: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            content: content.to_string(),
            score: 0.0,
            source: source.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }
}

/// Success data of a lane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanePayload {
    #[serde(default)]
    pub items: Vec<RankedItem>,
    /// Generated text (synthesis lanes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Lane deliberately surfaced an incomplete result
    #[serde(default)]
    pub partial: bool,
}

impl LanePayload {
    pub fn items(items: Vec<RankedItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            answer: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn mark_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Items for search lanes, 1 for a bare answer.
    pub fn item_count(&self) -> usize {
        if self.items.is_empty() && self.answer.is_some() {
            1
        } else {
            self.items.len()
        }
    }
}

// ============================================================================
// Result
// ============================================================================

/// Uniform outcome record of one lane for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneResult {
    pub lane: String,
    pub status: LaneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<LanePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub allocated_budget_ms: u64,
    pub effective_timeout_ms: u64,
    pub elapsed_ms: u64,
    pub items_returned: usize,
    pub priority: u32,
    pub required: bool,
}

impl LaneResult {
    /// Placeholder before dispatch.
    pub fn pending(config: &LaneConfig, allocated_budget_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            lane: config.name.clone(),
            status: LaneStatus::Pending,
            payload: None,
            error: None,
            started_at: now,
            ended_at: now,
            allocated_budget_ms,
            effective_timeout_ms: 0,
            elapsed_ms: 0,
            items_returned: 0,
            priority: config.priority,
            required: config.required,
        }
    }

    /// Lane not invoked (breaker open or zero budget).
    pub fn skipped(config: &LaneConfig, allocated_budget_ms: u64, reason: &str) -> Self {
        Self {
            status: LaneStatus::Skipped,
            error: Some(reason.to_string()),
            ..Self::pending(config, allocated_budget_ms)
        }
    }

    /// Lane not invoked (no allocatable budget).
    pub fn deferred(config: &LaneConfig, allocated_budget_ms: u64, reason: &str) -> Self {
        Self {
            status: LaneStatus::Deferred,
            error: Some(reason.to_string()),
            ..Self::pending(config, allocated_budget_ms)
        }
    }

    pub fn completed(
        config: &LaneConfig,
        allocated_budget_ms: u64,
        effective_timeout_ms: u64,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        payload: LanePayload,
    ) -> Self {
        Self {
            status: LaneStatus::Completed,
            items_returned: payload.item_count(),
            payload: Some(payload),
            started_at,
            ended_at: Utc::now(),
            effective_timeout_ms,
            elapsed_ms,
            ..Self::pending(config, allocated_budget_ms)
        }
    }

    pub fn timed_out(
        config: &LaneConfig,
        allocated_budget_ms: u64,
        effective_timeout_ms: u64,
        started_at: DateTime<Utc>,
        reason: &str,
    ) -> Self {
        Self {
            status: LaneStatus::Timeout,
            error: Some(reason.to_string()),
            started_at,
            ended_at: Utc::now(),
            effective_timeout_ms,
            elapsed_ms: effective_timeout_ms,
            ..Self::pending(config, allocated_budget_ms)
        }
    }

    pub fn failed(
        config: &LaneConfig,
        allocated_budget_ms: u64,
        effective_timeout_ms: u64,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        error: String,
    ) -> Self {
        Self {
            status: LaneStatus::Failed,
            error: Some(error),
            started_at,
            ended_at: Utc::now(),
            effective_timeout_ms,
            elapsed_ms,
            ..Self::pending(config, allocated_budget_ms)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == LaneStatus::Completed
    }

    /// Completed with a lane-declared partial payload.
    pub fn is_partial(&self) -> bool {
        self.is_completed() && self.payload.as_ref().is_some_and(|p| p.partial)
    }

    /// Budget handed back to the slack pool.
    pub fn unused_budget_ms(&self) -> u64 {
        self.allocated_budget_ms.saturating_sub(self.elapsed_ms)
    }
}

// ============================================================================
// Shared context
// ============================================================================

/// Payloads of earlier lanes, keyed by lane name. Each slot is written once.
///
/// The runner also stamps the receiving lane's effective timeout so that
/// composite lanes (fusion) can size their own sub-budget to fit inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    slots: BTreeMap<String, LanePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a lane's slot. Returns false (and keeps the old value) if the
    /// slot was already written.
    pub fn insert(&mut self, lane: &str, payload: LanePayload) -> bool {
        if self.slots.contains_key(lane) {
            return false;
        }
        self.slots.insert(lane.to_string(), payload);
        true
    }

    pub fn get(&self, lane: &str) -> Option<&LanePayload> {
        self.slots.get(lane)
    }

    /// Effective timeout of the lane this context was handed to, if dispatched
    /// through a runner.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = Some(timeout_ms);
    }

    pub fn lanes(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LanePayload)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every ranked item in the context, in lane-name order.
    pub fn all_items(&self) -> impl Iterator<Item = &RankedItem> {
        self.slots.values().flat_map(|p| p.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_context_is_write_once() {
        let mut ctx = SharedContext::new();
        assert!(ctx.insert("web", LanePayload::answer("first")));
        assert!(!ctx.insert("web", LanePayload::answer("second")));
        assert_eq!(
            ctx.get("web").and_then(|p| p.answer.as_deref()),
            Some("first")
        );
    }

    #[test]
    fn test_timeout_stamp_does_not_touch_slots() {
        let mut ctx = SharedContext::new();
        assert_eq!(ctx.timeout_ms(), None);
        ctx.insert("web", LanePayload::default());
        ctx.set_timeout_ms(450);
        assert_eq!(ctx.timeout_ms(), Some(450));
        assert_eq!(ctx.lanes().collect::<Vec<_>>(), vec!["web"]);
    }

    #[test]
    fn test_item_count_for_answer_payload() {
        assert_eq!(LanePayload::answer("hi").item_count(), 1);
        assert_eq!(LanePayload::default().item_count(), 0);
        let items = vec![
            RankedItem::new("a", "A", "web"),
            RankedItem::new("b", "B", "web"),
        ];
        assert_eq!(LanePayload::items(items).item_count(), 2);
    }

    #[test]
    fn test_status_classification() {
        assert!(LaneStatus::Timeout.is_failure());
        assert!(LaneStatus::Failed.is_failure());
        assert!(!LaneStatus::Deferred.is_failure());
        assert!(!LaneStatus::Skipped.was_dispatched());
        assert!(!LaneStatus::Running.is_terminal());
    }

    #[test]
    fn test_unused_budget() {
        let config = LaneConfig::new("vector", 2_000);
        let result = LaneResult::completed(
            &config,
            1_500,
            1_500,
            Utc::now(),
            400,
            LanePayload::default(),
        );
        assert_eq!(result.unused_budget_ms(), 1_100);
        assert_eq!(result.elapsed_ms, 400);
    }
}
