//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! Source partition
//!     → receive (poll timeout)
//!     → breaker.permit()?
//!         no  → hold record, pause intake, cool down, retry
//!         yes → send (send timeout)
//!               → policy classifies result → breaker.report_outcome()
//!               → ok:            commit offset, read next
//!               → network/timeout: hold record, retry
//!               → application:   skip record, read next
//! ```
//!
//! # Design Decisions
//! - One worker, one record at a time: commits are strictly ordered
//! - A record is committed only after the destination acknowledged it
//! - Intake stays paused until the breaker is closed again

pub mod error;
pub mod worker;

pub use error::RelayError;
pub use worker::{RelayLoop, RelayStats, RelayTimings};
