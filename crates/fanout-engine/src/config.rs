//! Configuration management for the orchestrator.
//!
//! Loads settings from `$FANOUT_CONFIG`, then /etc/fanout/config.toml, else
//! defaults. Environment overrides (`FANOUT_*`) are applied on top, then the
//! result is validated. The assembled `Config` is immutable and shared behind
//! an `Arc`.

use anyhow::Result;
use fanout_shared::{names, DeadlineSpec, LaneConfig, Mode, OrchestrationError, SuccessPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/fanout/config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "FANOUT_CONFIG";

// ============================================================================
// Orchestrator
// ============================================================================

/// Global deadline and success policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard wall-clock deadline per query
    #[serde(default = "default_global_deadline")]
    pub global_deadline_ms: u64,

    /// Time held back for aggregation
    #[serde(default = "default_reserve")]
    pub orchestrator_reserve_ms: u64,

    /// Time-to-first-token target
    #[serde(default = "default_ttft_target")]
    pub ttft_target_ms: u64,

    /// Responses slower than this are flagged `within_budget = false`
    #[serde(default = "default_max_total_time")]
    pub max_total_time_ms: u64,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_true")]
    pub return_partial_results: bool,

    #[serde(default = "default_true")]
    pub require_at_least_one_lane: bool,

    /// A required lane that did not complete always fails the query
    #[serde(default)]
    pub strict_required_lanes: bool,

    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Extra wait past the deadline before outstanding lanes are aborted
    #[serde(default = "default_join_grace")]
    pub join_grace_ms: u64,
}

fn default_global_deadline() -> u64 {
    12_000
}

fn default_reserve() -> u64 {
    500
}

fn default_ttft_target() -> u64 {
    3_000
}

fn default_max_total_time() -> u64 {
    12_000
}

fn default_true() -> bool {
    true
}

fn default_max_query_chars() -> usize {
    4_096
}

fn default_join_grace() -> u64 {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_deadline_ms: default_global_deadline(),
            orchestrator_reserve_ms: default_reserve(),
            ttft_target_ms: default_ttft_target(),
            max_total_time_ms: default_max_total_time(),
            mode: Mode::default(),
            return_partial_results: true,
            require_at_least_one_lane: true,
            strict_required_lanes: false,
            max_query_chars: default_max_query_chars(),
            join_grace_ms: default_join_grace(),
        }
    }
}

// ============================================================================
// Lanes
// ============================================================================

/// Static settings of one lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_lane_timeout")]
    pub timeout_ms: u64,

    /// Reporting order only
    #[serde(default = "default_lane_priority")]
    pub priority: u32,

    #[serde(default)]
    pub required: bool,
}

fn default_lane_timeout() -> u64 {
    2_000
}

fn default_lane_priority() -> u32 {
    100
}

impl LaneSettings {
    fn new(timeout_ms: u64, priority: u32) -> Self {
        Self {
            enabled: true,
            timeout_ms,
            priority,
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Per-lane settings for the built-in lanes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanesConfig {
    #[serde(default = "default_web_lane")]
    pub web: LaneSettings,

    #[serde(default = "default_vector_lane")]
    pub vector: LaneSettings,

    #[serde(default = "default_knowledge_graph_lane")]
    pub knowledge_graph: LaneSettings,

    #[serde(default = "default_video_lane")]
    pub video: LaneSettings,

    #[serde(default = "default_fusion_lane")]
    pub fusion: LaneSettings,

    /// Synthesis is required unless the file says otherwise
    #[serde(default = "default_synthesis_lane")]
    pub synthesis: LaneSettings,
}

fn default_web_lane() -> LaneSettings {
    LaneSettings::new(2_500, 1)
}

fn default_vector_lane() -> LaneSettings {
    LaneSettings::new(2_000, 2)
}

fn default_knowledge_graph_lane() -> LaneSettings {
    LaneSettings::new(2_000, 3)
}

fn default_video_lane() -> LaneSettings {
    LaneSettings::new(3_000, 4)
}

fn default_fusion_lane() -> LaneSettings {
    LaneSettings::new(3_000, 5)
}

fn default_synthesis_lane() -> LaneSettings {
    LaneSettings::new(8_000, 10).required()
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            web: default_web_lane(),
            vector: default_vector_lane(),
            knowledge_graph: default_knowledge_graph_lane(),
            video: default_video_lane(),
            fusion: default_fusion_lane(),
            synthesis: default_synthesis_lane(),
        }
    }
}

impl LanesConfig {
    /// Built-in lane names, data lanes first
    pub const NAMES: [&'static str; 6] = [
        names::WEB,
        names::VECTOR,
        names::KNOWLEDGE_GRAPH,
        names::VIDEO,
        names::FUSION,
        names::SYNTHESIS,
    ];

    pub fn get(&self, name: &str) -> Option<&LaneSettings> {
        match name {
            names::WEB => Some(&self.web),
            names::VECTOR => Some(&self.vector),
            names::KNOWLEDGE_GRAPH => Some(&self.knowledge_graph),
            names::VIDEO => Some(&self.video),
            names::FUSION => Some(&self.fusion),
            names::SYNTHESIS => Some(&self.synthesis),
            _ => None,
        }
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut LaneSettings> {
        match name {
            names::WEB => Some(&mut self.web),
            names::VECTOR => Some(&mut self.vector),
            names::KNOWLEDGE_GRAPH => Some(&mut self.knowledge_graph),
            names::VIDEO => Some(&mut self.video),
            names::FUSION => Some(&mut self.fusion),
            names::SYNTHESIS => Some(&mut self.synthesis),
            _ => None,
        }
    }
}

// ============================================================================
// Circuit breaker / fusion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Index-fabric fusion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Sub-deadline for all fusion sub-lanes
    #[serde(default = "default_fusion_budget")]
    pub budget_ms: u64,

    #[serde(default = "default_true")]
    pub rrf_enabled: bool,

    /// RRF smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    #[serde(default = "default_max_results_per_lane")]
    pub max_results_per_lane: usize,

    #[serde(default = "default_max_fused_results")]
    pub max_fused_results: usize,

    #[serde(default = "default_fulltext_timeout")]
    pub fulltext_timeout_ms: u64,

    #[serde(default = "default_vector_primary_timeout")]
    pub vector_primary_timeout_ms: u64,

    #[serde(default = "default_vector_local_timeout")]
    pub vector_local_timeout_ms: u64,

    #[serde(default = "default_graph_timeout")]
    pub graph_timeout_ms: u64,
}

fn default_fusion_budget() -> u64 {
    3_000
}

fn default_rrf_k() -> u32 {
    60
}

fn default_max_results_per_lane() -> usize {
    20
}

fn default_max_fused_results() -> usize {
    10
}

fn default_fulltext_timeout() -> u64 {
    800
}

fn default_vector_primary_timeout() -> u64 {
    700
}

fn default_vector_local_timeout() -> u64 {
    600
}

fn default_graph_timeout() -> u64 {
    700
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_fusion_budget(),
            rrf_enabled: true,
            rrf_k: default_rrf_k(),
            max_results_per_lane: default_max_results_per_lane(),
            max_fused_results: default_max_fused_results(),
            fulltext_timeout_ms: default_fulltext_timeout(),
            vector_primary_timeout_ms: default_vector_primary_timeout(),
            vector_local_timeout_ms: default_vector_local_timeout(),
            graph_timeout_ms: default_graph_timeout(),
        }
    }
}

impl FusionConfig {
    /// Sub-lane names with their declared timeouts, in merge order
    pub fn sub_lane_timeouts(&self) -> [(&'static str, u64); 4] {
        [
            ("fulltext", self.fulltext_timeout_ms),
            ("vector_primary", self.vector_primary_timeout_ms),
            ("vector_local", self.vector_local_timeout_ms),
            ("graph", self.graph_timeout_ms),
        ]
    }
}

// ============================================================================
// Root
// ============================================================================

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub lanes: LanesConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub fusion: FusionConfig,
}

impl Config {
    /// Load from file, apply environment overrides, validate.
    /// Falls back to defaults when no file is readable.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// `load` against an arbitrary environment lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = lookup(CONFIG_ENV)
            .ok_or_else(|| anyhow::anyhow!("{} not set", CONFIG_ENV))
            .and_then(|path| Self::load_from_path(&path))
            .or_else(|_| Self::load_from_path(CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            });
        config.apply_env_overrides(&lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load one explicit file, apply environment overrides, validate.
    /// Unlike `load`, a missing or malformed file is an error.
    pub fn load_file_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load config from specific path (no overrides, no validation)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `FANOUT_*` overrides. `lookup` is `std::env::var` in production
    /// and a map in tests. Unparseable values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let o = &mut self.orchestrator;
        override_parsed(&lookup, "FANOUT_GLOBAL_DEADLINE_MS", &mut o.global_deadline_ms);
        override_parsed(&lookup, "FANOUT_ORCHESTRATOR_RESERVE_MS", &mut o.orchestrator_reserve_ms);
        override_parsed(&lookup, "FANOUT_TTFT_TARGET_MS", &mut o.ttft_target_ms);
        override_parsed(&lookup, "FANOUT_MAX_TOTAL_TIME_MS", &mut o.max_total_time_ms);
        override_parsed(&lookup, "FANOUT_MODE", &mut o.mode);
        override_bool(&lookup, "FANOUT_RETURN_PARTIAL_RESULTS", &mut o.return_partial_results);
        override_bool(&lookup, "FANOUT_REQUIRE_AT_LEAST_ONE_LANE", &mut o.require_at_least_one_lane);
        override_bool(&lookup, "FANOUT_STRICT_REQUIRED_LANES", &mut o.strict_required_lanes);

        for name in LanesConfig::NAMES {
            if let Some(lane) = self.lanes.get_mut(name) {
                let prefix = format!("FANOUT_{}", name.to_uppercase());
                override_parsed(&lookup, &format!("{}_TIMEOUT_MS", prefix), &mut lane.timeout_ms);
                override_bool(&lookup, &format!("{}_ENABLED", prefix), &mut lane.enabled);
            }
        }

        let cb = &mut self.circuit_breaker;
        override_parsed(&lookup, "FANOUT_CB_FAILURE_THRESHOLD", &mut cb.failure_threshold);
        override_parsed(&lookup, "FANOUT_CB_COOLDOWN_MS", &mut cb.cooldown_ms);

        let f = &mut self.fusion;
        override_parsed(&lookup, "FANOUT_FUSION_BUDGET_MS", &mut f.budget_ms);
        override_bool(&lookup, "FANOUT_RRF_ENABLED", &mut f.rrf_enabled);
        override_parsed(&lookup, "FANOUT_RRF_K", &mut f.rrf_k);
        override_parsed(&lookup, "FANOUT_MAX_RESULTS_PER_LANE", &mut f.max_results_per_lane);
        override_parsed(&lookup, "FANOUT_MAX_FUSED_RESULTS", &mut f.max_fused_results);
    }

    /// Reject configurations the orchestrator cannot honor
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        let o = &self.orchestrator;
        if o.global_deadline_ms == 0 {
            return Err(OrchestrationError::Config(
                "global_deadline_ms must be greater than 0".to_string(),
            ));
        }
        if o.orchestrator_reserve_ms >= o.global_deadline_ms {
            return Err(OrchestrationError::Config(format!(
                "orchestrator_reserve_ms ({}) must be less than global_deadline_ms ({})",
                o.orchestrator_reserve_ms, o.global_deadline_ms
            )));
        }
        if o.max_query_chars == 0 {
            return Err(OrchestrationError::Config(
                "max_query_chars must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(OrchestrationError::Config(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.fusion.rrf_k == 0 {
            return Err(OrchestrationError::Config("fusion.rrf_k must be at least 1".to_string()));
        }
        if self.fusion.max_fused_results == 0 {
            return Err(OrchestrationError::Config(
                "fusion.max_fused_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Lane config for a built-in lane name
    pub fn lane_config(&self, name: &str) -> Option<LaneConfig> {
        self.lanes.get(name).map(|s| LaneConfig {
            name: name.to_string(),
            enabled: s.enabled,
            timeout_ms: s.timeout_ms,
            priority: s.priority,
            required: s.required,
        })
    }

    pub fn deadline_spec(&self) -> DeadlineSpec {
        DeadlineSpec {
            global_deadline_ms: self.orchestrator.global_deadline_ms,
            orchestrator_reserve_ms: self.orchestrator.orchestrator_reserve_ms,
            ttft_target_ms: self.orchestrator.ttft_target_ms,
        }
    }

    pub fn success_policy(&self) -> SuccessPolicy {
        SuccessPolicy {
            require_at_least_one_lane: self.orchestrator.require_at_least_one_lane,
            return_partial_results: self.orchestrator.return_partial_results,
            strict_required_lanes: self.orchestrator.strict_required_lanes,
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key = key, value = %raw, "ignoring unparseable environment override"),
        }
    }
}

fn override_bool<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => warn!(key = key, value = %raw, "ignoring unparseable environment override"),
        }
    }
}
