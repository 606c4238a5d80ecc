//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ratio in (0, 1], durations > 0)
//! - Check the selected transport is fully described
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{RelayConfig, TransportKind};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let breaker = &config.breaker;
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::new(
            "breaker.failure_ratio",
            format!("must be in (0, 1], got {}", breaker.failure_ratio),
        ));
    }
    if breaker.sampling_duration_ms == 0 {
        errors.push(ValidationError::new("breaker.sampling_duration_ms", "must be greater than 0"));
    }
    if breaker.minimum_throughput == 0 {
        errors.push(ValidationError::new("breaker.minimum_throughput", "must be at least 1"));
    }
    if breaker.break_duration_ms == 0 {
        errors.push(ValidationError::new("breaker.break_duration_ms", "must be greater than 0"));
    }
    if breaker.handled_errors.is_empty() {
        errors.push(ValidationError::new(
            "breaker.handled_errors",
            "at least one error kind must count as a failure",
        ));
    }

    if config.relay.poll_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.poll_timeout_ms", "must be greater than 0"));
    }
    if config.relay.cooldown_ms == 0 {
        errors.push(ValidationError::new("relay.cooldown_ms", "must be greater than 0"));
    }
    if config.relay.send_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.send_timeout_ms", "must be greater than 0"));
    }

    match config.transport.kind {
        TransportKind::File => {
            let file = &config.transport.file;
            if file.source_path.is_empty() {
                errors.push(ValidationError::new("transport.file.source_path", "must not be empty"));
            }
            if file.destination_path.is_empty() {
                errors.push(ValidationError::new("transport.file.destination_path", "must not be empty"));
            }
            if !file.source_path.is_empty() && file.source_path == file.destination_path {
                errors.push(ValidationError::new(
                    "transport.file.destination_path",
                    "must differ from source_path",
                ));
            }
        }
        TransportKind::Kafka => {
            let kafka = &config.transport.kafka;
            for (field, value) in [
                ("transport.kafka.bootstrap_servers", &kafka.bootstrap_servers),
                ("transport.kafka.source_topic", &kafka.source_topic),
                ("transport.kafka.target_topic", &kafka.target_topic),
                ("transport.kafka.consumer_group", &kafka.consumer_group),
            ] {
                if value.is_empty() {
                    errors.push(ValidationError::new(field, "must not be empty"));
                }
            }
            if !kafka.source_topic.is_empty() && kafka.source_topic == kafka.target_topic {
                errors.push(ValidationError::new(
                    "transport.kafka.target_topic",
                    "must differ from source_topic",
                ));
            }
        }
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
