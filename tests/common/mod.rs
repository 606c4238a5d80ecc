//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use partition_relay::config::{FileTransportConfig, RelayConfig};
use partition_relay::lifecycle::Shutdown;
use partition_relay::relay::{RelayLoop, RelayStats, RelayTimings};
use partition_relay::resilience::{BreakerEvent, CircuitBreaker};
use partition_relay::transport::Transport;

/// Config with a small window and short timings.
///
/// Two failures in a row open the breaker for one second; the relay
/// re-checks every 200ms and gives a send 500ms.
pub fn fast_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.breaker.failure_ratio = 0.5;
    config.breaker.minimum_throughput = 2;
    config.breaker.sampling_duration_ms = 10_000;
    config.breaker.break_duration_ms = 1_000;
    config.relay.poll_timeout_ms = 50;
    config.relay.cooldown_ms = 200;
    config.relay.send_timeout_ms = 500;
    config
}

pub fn file_config(dir: &std::path::Path) -> FileTransportConfig {
    FileTransportConfig {
        source_path: dir.join("source.log").display().to_string(),
        destination_path: dir.join("destination.log").display().to_string(),
        offset_path: None,
    }
}

/// A relay running on its own task, with a handle on its breaker.
pub struct RunningRelay {
    pub breaker: Arc<CircuitBreaker>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<RelayStats>,
}

impl RunningRelay {
    pub fn events(&self) -> broadcast::Receiver<BreakerEvent> {
        self.breaker.subscribe()
    }

    pub async fn stop(self) -> RelayStats {
        self.shutdown.trigger();
        self.handle.await.expect("relay task panicked")
    }
}

/// Spawn a relay over `transport`, subscribing to breaker events first.
pub fn start_relay<T: Transport + 'static>(
    config: &RelayConfig,
    transport: T,
) -> (RunningRelay, broadcast::Receiver<BreakerEvent>) {
    let breaker = Arc::new(
        CircuitBreaker::new("test", config.breaker.breaker_config()).expect("valid breaker config"),
    );
    let events = breaker.subscribe();
    let relay = RelayLoop::new(
        transport,
        breaker.clone(),
        config.breaker.failure_policy(),
        RelayTimings::from(&config.relay),
    );
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(relay.run(shutdown.subscribe()));
    (
        RunningRelay {
            breaker,
            shutdown,
            handle,
        },
        events,
    )
}

/// Poll `condition` every 10ms until it holds; panic after `limit`.
pub async fn wait_until<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within {:?}", limit);
}

/// Next breaker event, or panic after `limit`.
pub async fn next_event(
    events: &mut broadcast::Receiver<BreakerEvent>,
    limit: Duration,
) -> BreakerEvent {
    within(limit, events.recv())
        .await
        .expect("breaker event channel closed")
}

pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| panic!("future did not complete within {:?}", limit))
}
