//! Partition relay library.
//!
//! Moves records from a source partition to a destination, committing each
//! source offset only after delivery, behind a failure-ratio circuit breaker.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod resilience;
pub mod transport;

pub use config::schema::RelayConfig;
pub use lifecycle::Shutdown;
pub use relay::{RelayLoop, RelayStats};
pub use resilience::{CircuitBreaker, CircuitState};
