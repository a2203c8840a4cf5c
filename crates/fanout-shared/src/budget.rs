//! Per-lane latency budgets.
//!
//! A budget table maps `(intent, mode)` to a millisecond allocation per lane.
//! Pure decision functions for testability: nothing in here runs a lane.

use crate::intent::QueryIntent;
use crate::lane::names;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Latency/quality trade-off selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl Mode {
    /// Multiplier in per-mille so truncation to whole milliseconds is exact.
    pub fn multiplier_permille(&self) -> u64 {
        match self {
            Self::Fast => 700,
            Self::Standard => 1_000,
            Self::Deep => 2_000,
        }
    }

    /// Scale a base allocation, truncating to whole milliseconds.
    pub fn scale(&self, base_ms: u64) -> u64 {
        base_ms.saturating_mul(self.multiplier_permille()) / 1_000
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = crate::error::OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "standard" => Ok(Self::Standard),
            "deep" => Ok(Self::Deep),
            other => Err(crate::error::OrchestrationError::Validation(format!(
                "unknown mode '{}' (expected fast, standard or deep)",
                other
            ))),
        }
    }
}

/// Base allocation for one lane across the four intents
/// (simple, technical, research, multimedia), before the mode multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRow {
    pub simple_ms: u64,
    pub technical_ms: u64,
    pub research_ms: u64,
    pub multimedia_ms: u64,
}

impl IntentRow {
    pub const fn new(simple_ms: u64, technical_ms: u64, research_ms: u64, multimedia_ms: u64) -> Self {
        Self {
            simple_ms,
            technical_ms,
            research_ms,
            multimedia_ms,
        }
    }

    /// Same allocation for every intent.
    pub const fn flat(ms: u64) -> Self {
        Self::new(ms, ms, ms, ms)
    }

    pub fn get(&self, intent: QueryIntent) -> u64 {
        match intent {
            QueryIntent::Simple => self.simple_ms,
            QueryIntent::Technical => self.technical_ms,
            QueryIntent::Research => self.research_ms,
            QueryIntent::Multimedia => self.multimedia_ms,
        }
    }
}

/// Budget table: lane name -> base allocation per intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTable {
    rows: BTreeMap<String, IntentRow>,
}

impl Default for BudgetTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl BudgetTable {
    /// Empty table (no lanes).
    pub fn empty() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    /// Standard table covering the built-in lanes.
    ///
    /// | intent     | web  | vector | kg   | video | fusion | synthesis |
    /// |------------|------|--------|------|-------|--------|-----------|
    /// | simple     | 1500 | 1000   | 800  | 0     | 3000   | 3000      |
    /// | technical  | 2000 | 1500   | 1500 | 0     | 3000   | 4000      |
    /// | research   | 2500 | 2000   | 2000 | 0     | 3000   | 5000      |
    /// | multimedia | 1500 | 1000   | 800  | 2500  | 3000   | 3500      |
    pub fn standard() -> Self {
        Self::empty()
            .with_lane(names::WEB, IntentRow::new(1_500, 2_000, 2_500, 1_500))
            .with_lane(names::VECTOR, IntentRow::new(1_000, 1_500, 2_000, 1_000))
            .with_lane(names::KNOWLEDGE_GRAPH, IntentRow::new(800, 1_500, 2_000, 800))
            .with_lane(names::VIDEO, IntentRow::new(0, 0, 0, 2_500))
            .with_lane(names::FUSION, IntentRow::flat(3_000))
            .with_lane(names::SYNTHESIS, IntentRow::new(3_000, 4_000, 5_000, 3_500))
    }

    /// Add or replace a lane row.
    pub fn with_lane(mut self, lane: &str, row: IntentRow) -> Self {
        self.rows.insert(lane.to_string(), row);
        self
    }

    /// Whether the table has an entry (possibly zero) for a lane.
    pub fn contains(&self, lane: &str) -> bool {
        self.rows.contains_key(lane)
    }

    /// Lane names covered by the table.
    pub fn lanes(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Allocation for one lane, `None` if the lane has no row.
    pub fn budget_for(&self, lane: &str, intent: QueryIntent, mode: Mode) -> Option<u64> {
        self.rows.get(lane).map(|row| mode.scale(row.get(intent)))
    }

    /// Allocation for every lane in the table.
    pub fn budgets(&self, intent: QueryIntent, mode: Mode) -> BTreeMap<String, u64> {
        self.rows
            .iter()
            .map(|(lane, row)| (lane.clone(), mode.scale(row.get(intent))))
            .collect()
    }
}

/// Pure function over the standard table.
pub fn budgets(intent: QueryIntent, mode: Mode) -> BTreeMap<String, u64> {
    BudgetTable::standard().budgets(intent, mode)
}

// Tests live in tests/budget_tests.rs
