//! Index-fabric result types.

use crate::lane::{LaneResult, RankedItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One item after fusion, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedItem {
    /// Identity used to merge duplicates across sub-lanes
    pub key: String,
    /// First-seen copy of the item
    pub item: RankedItem,
    /// Accumulated reciprocal-rank score (0.0 when RRF is disabled)
    pub fused_score: f64,
    /// Sub-lanes that returned this item, in first-contribution order
    pub contributing_lanes: Vec<String>,
}

/// Output of one fusion pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub query: String,
    pub items: Vec<FusedItem>,
    pub lane_results: BTreeMap<String, LaneResult>,
    pub fusion_time_ms: u64,
    pub total_time_ms: u64,
    pub within_budget: bool,
    pub successful_lanes: usize,
    pub failed_lanes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FusedResult {
    /// True when at least one sub-lane succeeded.
    pub fn is_usable(&self) -> bool {
        self.error.is_none()
    }

    /// Some but not all sub-lanes contributed.
    pub fn is_partial(&self) -> bool {
        self.successful_lanes > 0 && self.failed_lanes > 0
    }

    /// Small JSON summary attached to the fusion lane payload.
    pub fn summary(&self) -> serde_json::Value {
        let lanes: BTreeMap<&str, &str> = self
            .lane_results
            .iter()
            .map(|(name, r)| (name.as_str(), r.status.as_str()))
            .collect();
        serde_json::json!({
            "fusion_time_ms": self.fusion_time_ms,
            "total_time_ms": self.total_time_ms,
            "within_budget": self.within_budget,
            "successful_lanes": self.successful_lanes,
            "failed_lanes": self.failed_lanes,
            "sub_lanes": lanes,
        })
    }
}
