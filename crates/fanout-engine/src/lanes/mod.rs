//! Lane trait abstraction and registry
//!
//! Every lane (search client, vector store, graph DB, LLM synthesis...) is an
//! opaque async operation behind the [`Lane`] trait. The orchestrator never
//! branches on lane identity except by name lookup into [`LaneRegistry`].
//!
//! ## Usage
//!
//! Production code registers real clients. Test code registers [`FakeLane`]s
//! with scripted latency/outcomes and a call counter.

pub mod fake;

pub use fake::{FakeLane, FakeLaneBuilder, FakeOutcome};

use async_trait::async_trait;
use fanout_shared::{names, LaneConfig, LaneError, LanePayload, SharedContext};
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// Lane Trait
// ============================================================================

/// One independently schedulable unit of work.
///
/// Implementations must be cancel-safe: the runner cancels a lane by dropping
/// (aborting) its future at the timeout, so cleanup cannot rely on reaching
/// the end of `run`.
#[async_trait]
pub trait Lane: Send + Sync {
    async fn run(&self, query: &str, ctx: &SharedContext) -> Result<LanePayload, LaneError>;
}

/// Adapter turning an async closure into a [`Lane`].
pub struct FnLane<F> {
    f: F,
}

impl<F, Fut> FnLane<F>
where
    F: Fn(String, SharedContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LanePayload, LaneError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Lane for FnLane<F>
where
    F: Fn(String, SharedContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LanePayload, LaneError>> + Send,
{
    async fn run(&self, query: &str, ctx: &SharedContext) -> Result<LanePayload, LaneError> {
        (self.f)(query.to_string(), ctx.clone()).await
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A lane together with its static configuration
#[derive(Clone)]
pub struct RegisteredLane {
    pub config: LaneConfig,
    pub lane: Arc<dyn Lane>,
}

impl RegisteredLane {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl std::fmt::Debug for RegisteredLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredLane")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Startup-built table of `(config, lane)` pairs
#[derive(Debug, Clone, Default)]
pub struct LaneRegistry {
    lanes: Vec<RegisteredLane>,
}

impl LaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lane, replacing any lane with the same name
    pub fn register(&mut self, config: LaneConfig, lane: Arc<dyn Lane>) {
        self.lanes.retain(|l| l.config.name != config.name);
        self.lanes.push(RegisteredLane { config, lane });
    }

    /// Builder-style `register`
    pub fn with_lane(mut self, config: LaneConfig, lane: Arc<dyn Lane>) -> Self {
        self.register(config, lane);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredLane> {
        self.lanes.iter().find(|l| l.config.name == name)
    }

    /// Enabled lanes, priority order
    pub fn enabled(&self) -> Vec<&RegisteredLane> {
        let mut lanes: Vec<&RegisteredLane> =
            self.lanes.iter().filter(|l| l.config.enabled).collect();
        lanes.sort_by(|a, b| {
            a.config
                .priority
                .cmp(&b.config.priority)
                .then_with(|| a.config.name.cmp(&b.config.name))
        });
        lanes
    }

    /// Enabled lanes other than synthesis, priority order
    pub fn data_lanes(&self) -> Vec<&RegisteredLane> {
        self.enabled()
            .into_iter()
            .filter(|l| l.config.name != names::SYNTHESIS)
            .collect()
    }

    /// The synthesis lane, if registered and enabled
    pub fn synthesis(&self) -> Option<&RegisteredLane> {
        self.get(names::SYNTHESIS).filter(|l| l.config.enabled)
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.enabled()
            .into_iter()
            .map(|l| l.config.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn Lane> {
        Arc::new(FnLane::new(|query: String, _ctx: SharedContext| async move {
            Ok::<_, LaneError>(LanePayload::answer(query))
        }))
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = LaneRegistry::new();
        registry.register(LaneConfig::new("web", 1_000), echo());
        registry.register(LaneConfig::new("web", 2_000), echo());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("web").map(|l| l.config.timeout_ms), Some(2_000));
    }

    #[test]
    fn test_data_lanes_exclude_synthesis_and_disabled() {
        let registry = LaneRegistry::new()
            .with_lane(LaneConfig::new("vector", 1_000).with_priority(2), echo())
            .with_lane(LaneConfig::new("web", 1_000).with_priority(1), echo())
            .with_lane(LaneConfig::new("video", 1_000).disabled(), echo())
            .with_lane(LaneConfig::new(names::SYNTHESIS, 1_000).required(), echo());

        let data: Vec<&str> = registry.data_lanes().iter().map(|l| l.name()).collect();
        assert_eq!(data, vec!["web", "vector"]);
        assert!(registry.synthesis().is_some());
        assert_eq!(registry.enabled_names().len(), 3);
    }

    #[tokio::test]
    async fn test_fn_lane_runs_closure() {
        let lane = echo();
        let payload = lane.run("hello", &SharedContext::new()).await.unwrap();
        assert_eq!(payload.answer.as_deref(), Some("hello"));
    }
}
