//! Error types for fanout.
//!
//! Lane-level problems (timeouts, open breakers, exhausted budget) are not
//! errors to the caller: they are recorded as `LaneStatus` values. Only request
//! validation, construction-time configuration mismatches and failures of the
//! orchestrator's own control logic surface as `OrchestrationError`.

use thiserror::Error;

/// Error returned by a lane implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaneError {
    #[error("{0}")]
    Failed(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("lane cancelled")]
    Cancelled,
}

impl LaneError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            LaneError::Failed(_) => "lane_failure",
            LaneError::Unavailable(_) => "lane_unavailable",
            LaneError::InvalidResponse(_) => "lane_invalid_response",
            LaneError::Cancelled => "lane_cancelled",
        }
    }
}

/// Error returned by the orchestrator entry point.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestrationError::Validation(_) => "validation_error",
            OrchestrationError::Config(_) => "config_error",
            OrchestrationError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(LaneError::failed("boom").code(), "lane_failure");
        assert_eq!(LaneError::Cancelled.code(), "lane_cancelled");
        assert_eq!(
            OrchestrationError::Validation("empty".into()).code(),
            "validation_error"
        );
    }

    #[test]
    fn test_failed_displays_bare_message() {
        assert_eq!(LaneError::failed("graph db down").to_string(), "graph db down");
    }
}
