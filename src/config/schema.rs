//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, FailurePolicy};
use crate::transport::ErrorKind;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Source and destination partitions.
    pub transport: TransportConfig,

    /// Circuit breaker thresholds.
    pub breaker: BreakerSettings,

    /// Relay loop timing.
    pub relay: LoopConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Which transport backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    File,
    Kafka,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub file: FileTransportConfig,
    pub kafka: KafkaTransportConfig,
}

/// Newline-delimited file source and destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileTransportConfig {
    /// File read as the source partition, one record per line.
    pub source_path: String,

    /// File the records are appended to.
    pub destination_path: String,

    /// Committed offset file (default: `<source_path>.offset`).
    pub offset_path: Option<String>,
}

impl Default for FileTransportConfig {
    fn default() -> Self {
        Self {
            source_path: "source.log".to_string(),
            destination_path: "destination.log".to_string(),
            offset_path: None,
        }
    }
}

/// Kafka source and target topics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaTransportConfig {
    pub bootstrap_servers: String,
    pub source_topic: String,
    pub target_topic: String,
    pub consumer_group: String,
}

impl Default for KafkaTransportConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            source_topic: "source".to_string(),
            target_topic: "target".to_string(),
            consumer_group: "partition-relay".to_string(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Failure ratio (0-1] at which the circuit opens.
    pub failure_ratio: f64,

    /// Sliding window length in milliseconds.
    pub sampling_duration_ms: u64,

    /// Outcomes needed in the window before the ratio is evaluated.
    pub minimum_throughput: usize,

    /// Time the circuit stays open before a trial, in milliseconds.
    pub break_duration_ms: u64,

    /// Error kinds that count as failures.
    pub handled_errors: Vec<ErrorKind>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_ratio: 0.9,
            sampling_duration_ms: 10_000,
            minimum_throughput: 3,
            break_duration_ms: 5_000,
            handled_errors: vec![ErrorKind::Network, ErrorKind::Timeout],
        }
    }
}

impl BreakerSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_ratio: self.failure_ratio,
            sampling_duration: Duration::from_millis(self.sampling_duration_ms),
            minimum_throughput: self.minimum_throughput,
            break_duration: Duration::from_millis(self.break_duration_ms),
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::new(self.handled_errors.iter().copied())
    }
}

/// Relay loop timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopConfig {
    /// How long one receive waits for a record, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Sleep after the breaker refuses an attempt, in milliseconds.
    pub cooldown_ms: u64,

    /// Deadline for a single send, in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1_000,
            cooldown_ms: 5_000,
            send_timeout_ms: 10_000,
        }
    }
}

impl LoopConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
