//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding attempt:
//!     → circuit_breaker.rs (permit? refuse fast while open)
//!     → timeouts.rs (bound the send)
//!     → policy.rs (does this error count against the downstream?)
//!     → window.rs (sliding failure ratio)
//!     → circuit_breaker.rs (transition on the new ratio)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every send has a deadline
//! - No retry backoff of its own; the breaker's break duration is the backoff
//! - Time comes from an injected `Clock` so transitions are testable

pub mod circuit_breaker;
pub mod clock;
pub mod policy;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerEvent, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use policy::FailurePolicy;
pub use window::{FailureWindow, Outcome};
