//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → converted into runtime settings for breaker, relay and transport
//! ```
//!
//! # Design Decisions
//! - Config is loaded once at startup and never reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerSettings, FileTransportConfig, KafkaTransportConfig, LogFormat, LoopConfig,
    ObservabilityConfig, RelayConfig, TransportConfig, TransportKind,
};
pub use validation::{validate_config, ValidationError};
