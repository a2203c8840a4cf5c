//! Lane supervision: circuit breakers that pre-emptively skip chronically
//! failing lanes for a cooldown window.

pub mod circuit;
pub mod registry;

pub use circuit::{CircuitBreaker, CircuitState};
pub use registry::{BreakerSnapshot, CircuitBreakerRegistry};
