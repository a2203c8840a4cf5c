//! Shared types and pure decision functions for fanout.
//!
//! Nothing in this crate runs a lane: intent classification, budget tables,
//! deadline arithmetic and the success/summary rules are all plain functions
//! so they can be tested without a runtime.

pub mod budget;
pub mod deadline;
pub mod error;
pub mod fusion;
pub mod intent;
pub mod lane;
pub mod response;

pub use budget::{budgets, BudgetTable, IntentRow, Mode};
pub use deadline::{DeadlineSpec, DeadlineTracker};
pub use error::{LaneError, OrchestrationError};
pub use fusion::{FusedItem, FusedResult};
pub use intent::{classify, QueryIntent};
pub use lane::{names, LaneConfig, LanePayload, LaneResult, LaneStatus, RankedItem, SharedContext};
pub use response::{
    all_lanes_failed, evaluate_success, LaneSummary, OrchestrateOptions, OrchestrationResponse,
    SlaCompliance, SuccessPolicy,
};
