//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay loop and circuit breaker produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every breaker transition is both logged and counted
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
