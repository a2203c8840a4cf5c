//! fanout-engine: async machinery of the deadline-aware multi-lane orchestrator.
//!
//! Pure types and decision functions live in `fanout-shared`; this crate runs
//! lanes under timeouts, circuit breakers and the global deadline.

pub mod config;
pub mod fusion;
pub mod lanes;
pub mod metrics;
pub mod orchestrator;
pub mod routes;
pub mod runner;
pub mod server;
pub mod supervisor;

pub use config::Config;
pub use fusion::{FusionEngine, FusionLane};
pub use lanes::{FakeLane, FnLane, Lane, LaneRegistry};
pub use metrics::{HealthView, MetricsSnapshot, OrchestrationMetrics};
pub use orchestrator::Orchestrator;
pub use runner::LaneRunner;
pub use supervisor::CircuitBreakerRegistry;
