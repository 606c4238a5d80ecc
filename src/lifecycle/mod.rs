//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Metrics → Transport → Breaker → Relay task
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Relay finishes its in-flight record → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: metrics first, then transport, then the relay
//! - Shutdown never cancels a send; the relay exits between records

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, spawn_relay, StartupError};
