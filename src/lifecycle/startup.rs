//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the breaker, failure policy and transport from a validated config
//! - Install the metrics endpoint when enabled
//! - Spawn the relay loop and wire it to the shutdown coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The relay starts last (records flow only when everything else is ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{RelayConfig, TransportKind};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::relay::{RelayLoop, RelayStats, RelayTimings};
use crate::resilience::circuit_breaker::BreakerConfigError;
use crate::resilience::CircuitBreaker;
use crate::transport::{FileTransport, Transport, TransportError};

/// Name the breaker reports under in logs and metrics.
pub const BREAKER_NAME: &str = "destination";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid breaker settings: {0}")]
    Breaker(#[from] BreakerConfigError),

    #[error("failed to open transport: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("kafka transport requested but this build lacks the `kafka` feature")]
    KafkaUnavailable,

    #[error("relay task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Build the breaker and spawn the relay over `transport`.
pub fn spawn_relay<T: Transport + 'static>(
    config: &RelayConfig,
    transport: T,
    shutdown: &Shutdown,
) -> Result<JoinHandle<RelayStats>, StartupError> {
    let breaker = Arc::new(CircuitBreaker::new(
        BREAKER_NAME,
        config.breaker.breaker_config(),
    )?);
    let relay = RelayLoop::new(
        transport,
        breaker,
        config.breaker.failure_policy(),
        RelayTimings::from(&config.relay),
    );
    Ok(tokio::spawn(relay.run(shutdown.subscribe())))
}

/// Start every subsystem and relay until SIGINT or SIGTERM.
pub async fn run(config: RelayConfig) -> Result<RelayStats, StartupError> {
    if config.observability.metrics_enabled {
        let address = &config.observability.metrics_address;
        let addr: SocketAddr = address
            .parse()
            .map_err(|source| StartupError::MetricsAddress {
                address: address.clone(),
                source,
            })?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let handle = match config.transport.kind {
        TransportKind::File => {
            let transport = FileTransport::open(&config.transport.file).await?;
            tracing::info!(
                source = %config.transport.file.source_path,
                destination = %config.transport.file.destination_path,
                resume_from = transport.committed(),
                "File transport ready"
            );
            spawn_relay(&config, transport, &shutdown)?
        }
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => {
            let kafka = &config.transport.kafka;
            let transport =
                crate::transport::KafkaTransport::connect(kafka, config.relay.send_timeout())?;
            tracing::info!(
                bootstrap_servers = %kafka.bootstrap_servers,
                source = %kafka.source_topic,
                target = %kafka.target_topic,
                group = %kafka.consumer_group,
                "Kafka transport ready"
            );
            spawn_relay(&config, transport, &shutdown)?
        }
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => return Err(StartupError::KafkaUnavailable),
    };

    let signal = signals::wait_for_signal().await;
    shutdown.trigger();
    let stats = handle.await?;
    let signal = signal.map_err(StartupError::Signal)?;
    tracing::info!(signal, "Shutdown complete");
    Ok(stats)
}
