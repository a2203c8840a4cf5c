//! Lane Simulator - runs the orchestrator against synthetic lanes
//!
//! Usage:
//!   lane_sim --scenario healthy
//!   lane_sim --scenario slow-vector --mode fast --queries 3
//!   lane_sim --scenario flaky-graph --queries 10 --seed 7
//!   lane_sim --scenario all-fail
//!   lane_sim --scenario multimedia --query "watch a demo of raft"
//!   lane_sim --scenario flaky-graph --serve 127.0.0.1:7870
//!
//! Prints a machine-readable JSON report to stdout. Logs go to stderr.
//! With `--serve`, keeps the health/metrics routes up after the run.

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use fanout_engine::config::Config;
use fanout_engine::fusion::{FusionEngine, FusionLane};
use fanout_engine::lanes::{Lane, LaneRegistry};
use fanout_engine::server::{self, AppState};
use fanout_engine::{CircuitBreakerRegistry, HealthView, MetricsSnapshot, OrchestrationMetrics, Orchestrator};
use fanout_shared::{
    names, BudgetTable, LaneError, LanePayload, LaneStatus, Mode, OrchestrateOptions, QueryIntent,
    RankedItem, SharedContext,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Scenario {
    /// Every lane answers within budget
    Healthy,
    /// The vector lane never answers inside its budget
    SlowVector,
    /// The knowledge-graph lane fails most of the time (trips its breaker)
    FlakyGraph,
    /// Every data lane fails; synthesis answers from an empty context
    AllFail,
    /// Video queries with the video lane enabled
    Multimedia,
}

#[derive(Parser, Debug)]
#[command(name = "lane_sim")]
#[command(about = "Run the fanout orchestrator against synthetic lanes", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, value_enum, default_value = "healthy")]
    scenario: Scenario,

    /// fast | standard | deep
    #[arg(long, default_value = "standard")]
    mode: String,

    /// Number of queries to run
    #[arg(long, default_value_t = 5)]
    queries: usize,

    /// Seed for latency jitter and failures
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Query text (defaults to one per scenario)
    #[arg(long)]
    query: Option<String>,

    /// TOML config file (else $FANOUT_CONFIG, /etc/fanout/config.toml, defaults).
    /// FANOUT_* environment overrides apply either way
    #[arg(long)]
    config: Option<String>,

    /// Serve /v1/health, /v1/metrics and /metrics on this address after the run
    #[arg(long, num_args = 0..=1, default_missing_value = server::DEFAULT_ADDR)]
    serve: Option<String>,
}

// ============================================================================
// Synthetic lanes
// ============================================================================

/// Lane with seeded latency jitter and failure rate
struct SimLane {
    name: String,
    base_ms: u64,
    jitter_ms: u64,
    failure_rate: f64,
    /// Ranked items per call; 0 means "synthesis" (answer text)
    items: usize,
    /// Item ids are drawn from `doc-0 .. doc-(pool-1)` so sources overlap
    pool: u64,
    rng: Mutex<StdRng>,
}

impl SimLane {
    fn new(name: &str, base_ms: u64, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            base_ms,
            jitter_ms: base_ms / 2,
            failure_rate: 0.0,
            items: 5,
            pool: 20,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn failing(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn synthesis(mut self) -> Self {
        self.items = 0;
        self
    }

    fn into_lane(self) -> Arc<dyn Lane> {
        Arc::new(self)
    }
}

#[async_trait]
impl Lane for SimLane {
    async fn run(&self, query: &str, ctx: &SharedContext) -> Result<LanePayload, LaneError> {
        let (latency_ms, fail, ids) = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let latency_ms = self.base_ms + rng.gen_range(0..=self.jitter_ms);
            let fail = rng.gen_bool(self.failure_rate);
            let ids: Vec<u64> = (0..self.items).map(|_| rng.gen_range(0..self.pool)).collect();
            (latency_ms, fail, ids)
        };

        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        if fail {
            return Err(LaneError::Unavailable(format!("{} backend unreachable", self.name)));
        }

        if self.items == 0 {
            let sources: Vec<&str> = ctx.lanes().collect();
            return Ok(LanePayload::answer(format!(
                "Answer to '{}' from {} sources [{}]",
                query,
                sources.len(),
                sources.join(", ")
            )));
        }

        let items = ids
            .iter()
            .enumerate()
            .map(|(rank, id)| {
                let doc = format!("doc-{}", id);
                RankedItem::new(&doc, &format!("{} hit {}", self.name, doc), &self.name)
                    .with_score(1.0 / (rank as f64 + 1.0))
            })
            .collect();
        Ok(LanePayload::items(items))
    }
}

// ============================================================================
// Scenario setup
// ============================================================================

fn default_query(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::Healthy | Scenario::SlowVector => "how to implement quicksort",
        Scenario::FlakyGraph => "compare raft and paxos consensus in a systematic study",
        Scenario::AllFail | Scenario::Multimedia => "watch a demo video of kubernetes autoscaling",
    }
}

fn build_orchestrator(config: Config, scenario: Scenario, seed: u64) -> Result<Orchestrator> {
    let config = Arc::new(config);
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.cooldown(),
    ));

    // Per-lane seeds so one lane's draws do not shift another's
    let lane_seed = |i: u64| seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(i);

    let mut fusion = FusionEngine::new(config.fusion.clone(), Arc::clone(&breakers));
    for (i, (name, _)) in config.fusion.sub_lane_timeouts().iter().enumerate() {
        fusion = fusion.with_sub_lane(name, SimLane::new(name, 150, lane_seed(100 + i as u64)).into_lane());
    }

    let data_lanes: [(&str, SimLane); 4] = [
        (names::WEB, SimLane::new(names::WEB, 300, lane_seed(1))),
        (names::VECTOR, SimLane::new(names::VECTOR, 200, lane_seed(2))),
        (names::KNOWLEDGE_GRAPH, SimLane::new(names::KNOWLEDGE_GRAPH, 250, lane_seed(3))),
        (names::VIDEO, SimLane::new(names::VIDEO, 400, lane_seed(4))),
    ];

    let mut registry = LaneRegistry::new();
    for (name, lane) in data_lanes {
        let lane = match (scenario, name) {
            (Scenario::SlowVector, names::VECTOR) => SimLane {
                base_ms: 10_000,
                ..lane
            },
            (Scenario::FlakyGraph, names::KNOWLEDGE_GRAPH) => lane.failing(0.8),
            (Scenario::AllFail, _) => lane.failing(1.0),
            _ => lane,
        };
        if let Some(lane_config) = config.lane_config(name) {
            registry.register(lane_config, lane.into_lane());
        }
    }

    let fusion_lane: Arc<dyn Lane> = if scenario == Scenario::AllFail {
        SimLane::new(names::FUSION, 100, lane_seed(5)).failing(1.0).into_lane()
    } else {
        Arc::new(FusionLane::new(Arc::new(fusion)))
    };
    if let Some(lane_config) = config.lane_config(names::FUSION) {
        registry.register(lane_config, fusion_lane);
    }
    if let Some(lane_config) = config.lane_config(names::SYNTHESIS) {
        registry.register(
            lane_config,
            SimLane::new(names::SYNTHESIS, 600, lane_seed(6)).synthesis().into_lane(),
        );
    }

    let metrics = Arc::new(OrchestrationMetrics::new()?);
    Ok(Orchestrator::with_parts(
        config,
        registry,
        BudgetTable::standard(),
        breakers,
        metrics,
    )?)
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct QueryReport {
    query_id: String,
    intent: QueryIntent,
    success: bool,
    total_time_ms: u64,
    ttft_ms: Option<u64>,
    slack_pool_ms: u64,
    lanes: BTreeMap<String, LaneStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    scenario: Scenario,
    mode: Mode,
    seed: u64,
    query: String,
    queries: Vec<QueryReport>,
    metrics: MetricsSnapshot,
    health: HealthView,
}

async fn simulate(cli: &Cli, mode: Mode) -> Result<(SimulationReport, Arc<Orchestrator>)> {
    let config = match &cli.config {
        Some(path) => Config::load_file_with(path, |key| std::env::var(key).ok())?,
        None => Config::load()?,
    };
    let orchestrator = Arc::new(build_orchestrator(config, cli.scenario, cli.seed)?);
    let query = cli
        .query
        .clone()
        .unwrap_or_else(|| default_query(cli.scenario).to_string());

    let mut queries = Vec::with_capacity(cli.queries);
    for i in 0..cli.queries {
        let response = orchestrator
            .orchestrate(&query, OrchestrateOptions::with_mode(mode))
            .await?;
        info!(query = i, success = response.success, "simulated query");
        queries.push(QueryReport {
            query_id: response.query_id.to_string(),
            intent: response.intent,
            success: response.success,
            total_time_ms: response.total_time_ms,
            ttft_ms: response.sla_compliance.ttft_ms,
            slack_pool_ms: response.sla_compliance.slack_pool_ms,
            lanes: response
                .lanes
                .iter()
                .map(|(name, r)| (name.clone(), r.status))
                .collect(),
            answer: response.answer_text().map(str::to_string),
            error: response.error.clone(),
        });
    }

    let report = SimulationReport {
        scenario: cli.scenario,
        mode,
        seed: cli.seed,
        query,
        queries,
        metrics: orchestrator.metrics_snapshot().await,
        health: orchestrator.health().await,
    };
    Ok((report, orchestrator))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
            let _ = e.print();
            return code;
        }
    };

    let mode = match Mode::from_str(&cli.mode) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, mode: Mode) -> Result<()> {
    let (report, orchestrator) = simulate(cli, mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(addr) = &cli.serve {
        server::run(AppState::new(orchestrator), addr).await?;
    }
    Ok(())
}
