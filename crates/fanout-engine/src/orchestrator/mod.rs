//! Multi-lane orchestration.
//!
//! Flow:
//! 1. Intent classification (pure, no I/O)
//! 2. Budget lookup per (intent, mode)
//! 3. Concurrent data lanes under the global deadline
//! 4. Synthesis over the shared context
//! 5. Aggregation + metrics
//!
//! Invariants:
//! - One hard wall-clock deadline per query
//! - Breakers skip chronically failing lanes for a cooldown window
//! - Every lane ends in exactly one terminal status

pub mod engine;

pub use engine::{Orchestrator, ALL_LANES_FAILED};
