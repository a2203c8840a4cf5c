//! Index fabric: parallel ranked sub-lanes merged by reciprocal-rank fusion.

pub mod engine;
pub mod rrf;

pub use engine::{FusionEngine, FusionLane, BREAKER_PREFIX, MERGE_MARGIN_MS};
pub use rrf::{fuse, fusion_key, RankedList};
