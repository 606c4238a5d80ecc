//! Failure injection tests for the relay.

use std::time::Duration;

use partition_relay::resilience::{BreakerEvent, CircuitState};
use partition_relay::transport::memory::Operation;
use partition_relay::transport::{ErrorKind, FileTransport, MemoryTransport};

mod common;

const LIMIT: Duration = Duration::from_secs(30);

fn seeded(values: &[&str]) -> MemoryTransport {
    let transport = MemoryTransport::new("orders");
    for value in values {
        transport.push(*value);
    }
    transport
}

#[tokio::test(start_paused = true)]
async fn test_outage_delivers_every_record_once_in_order() {
    let transport = seeded(&["a", "b", "c", "d", "e"]);
    transport.fail_sends(Some(ErrorKind::Network));
    let (relay, mut events) = common::start_relay(&common::fast_config(), transport.clone());

    match common::next_event(&mut events, LIMIT).await {
        BreakerEvent::Opened { cause, .. } => assert!(cause.contains("network"), "{cause}"),
        other => panic!("expected Opened, got {other:?}"),
    }
    common::wait_until(LIMIT, || transport.is_paused()).await;
    transport.fail_sends(None);

    common::wait_until(LIMIT, || transport.committed() == Some(4)).await;
    let stats = relay.stop().await;

    assert_eq!(transport.sent_values(), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(stats.forwarded, 5);
    assert_eq!(stats.failed, 2);
    assert!(stats.refused >= 1);
    assert_eq!(transport.toggle_counts(), (1, 1));
    assert!(!transport.is_paused());
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_then_recovers() {
    let transport = seeded(&["a"]);
    transport.fail_sends(Some(ErrorKind::Network));
    let (relay, mut events) = common::start_relay(&common::fast_config(), transport.clone());

    assert!(matches!(
        common::next_event(&mut events, LIMIT).await,
        BreakerEvent::Opened { .. }
    ));
    assert_eq!(common::next_event(&mut events, LIMIT).await, BreakerEvent::HalfOpened);
    assert!(matches!(
        common::next_event(&mut events, LIMIT).await,
        BreakerEvent::Opened { .. }
    ));

    transport.fail_sends(None);
    assert_eq!(common::next_event(&mut events, LIMIT).await, BreakerEvent::HalfOpened);
    assert_eq!(common::next_event(&mut events, LIMIT).await, BreakerEvent::Closed);

    common::wait_until(LIMIT, || transport.committed() == Some(0)).await;
    let breaker = relay.breaker.clone();
    let stats = relay.stop().await;

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(transport.sent_values(), vec!["a"]);
    assert_eq!(stats.failed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_destination_trips_send_timeout() {
    let transport = seeded(&["a"]);
    transport.delay_sends(Some(Duration::from_secs(2)));
    let (relay, mut events) = common::start_relay(&common::fast_config(), transport.clone());

    match common::next_event(&mut events, LIMIT).await {
        BreakerEvent::Opened { cause, .. } => assert!(cause.contains("timeout"), "{cause}"),
        other => panic!("expected Opened, got {other:?}"),
    }
    transport.delay_sends(None);

    common::wait_until(LIMIT, || transport.committed() == Some(0)).await;
    let stats = relay.stop().await;

    // Timed-out attempts never reached the destination.
    assert_eq!(transport.sent_values(), vec!["a"]);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.forwarded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_records_do_not_open_breaker() {
    let transport = seeded(&["a", "b", "c", "d"]);
    transport.fail_sends(Some(ErrorKind::Application));
    let (relay, mut events) = common::start_relay(&common::fast_config(), transport.clone());

    common::wait_until(LIMIT, || {
        transport
            .journal()
            .iter()
            .filter(|op| matches!(op, Operation::Send(_)))
            .count()
            == 4
    })
    .await;
    let breaker = relay.breaker.clone();
    let stats = relay.stop().await;

    assert_eq!(stats.skipped, 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.refused, 0);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(events.try_recv().is_err());
    assert!(transport.sent().is_empty());
    assert_eq!(transport.committed(), None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_cooldown() {
    let mut config = common::fast_config();
    config.relay.cooldown_ms = 30_000;
    config.breaker.break_duration_ms = 60_000;
    let transport = seeded(&["a", "b"]);
    transport.fail_sends(Some(ErrorKind::Network));
    let (relay, mut events) = common::start_relay(&config, transport.clone());

    assert!(matches!(
        common::next_event(&mut events, LIMIT).await,
        BreakerEvent::Opened { .. }
    ));
    relay.shutdown.trigger();
    let stats = common::within(Duration::from_secs(1), relay.handle)
        .await
        .unwrap();

    assert_eq!(stats.forwarded, 0);
    assert!(stats.refused <= 1);
    assert_eq!(transport.committed(), None);
    assert!(!transport.journal().contains(&Operation::Receive(1)));
}

#[tokio::test]
async fn test_file_relay_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::fast_config();
    config.transport.file = common::file_config(dir.path());
    let file = config.transport.file.clone();
    std::fs::write(&file.source_path, "one\ntwo\nthree\n").unwrap();

    let read_destination = || std::fs::read_to_string(&file.destination_path).unwrap_or_default();

    let transport = FileTransport::open(&file).await.unwrap();
    let (relay, _) = common::start_relay(&config, transport);
    common::wait_until(Duration::from_secs(10), || read_destination().lines().count() == 3).await;
    let first = relay.stop().await;
    assert_eq!(first.forwarded, 3);

    let mut source = std::fs::OpenOptions::new()
        .append(true)
        .open(&file.source_path)
        .unwrap();
    std::io::Write::write_all(&mut source, b"four\nfive\n").unwrap();

    let transport = FileTransport::open(&file).await.unwrap();
    assert_eq!(transport.committed(), 3);
    let (relay, _) = common::start_relay(&config, transport);
    common::wait_until(Duration::from_secs(10), || read_destination().lines().count() == 5).await;
    let second = relay.stop().await;

    assert_eq!(second.forwarded, 2);
    assert_eq!(read_destination(), "one\ntwo\nthree\nfour\nfive\n");
}

#[tokio::test(start_paused = true)]
async fn test_unhandled_kind_is_skipped_not_counted() {
    let mut config = common::fast_config();
    config.breaker.handled_errors = vec![ErrorKind::Network];
    let transport = seeded(&["slow", "b"]);
    transport.script_sends([Some(ErrorKind::Timeout)]);
    let (relay, mut events) = common::start_relay(&config, transport.clone());

    common::wait_until(LIMIT, || transport.committed() == Some(1)).await;
    let breaker = relay.breaker.clone();
    let stats = relay.stop().await;

    // Timeouts are not handled here, so "slow" is dropped instead of retried.
    assert_eq!(stats.skipped, 1);
    assert_eq!(transport.sent_values(), vec!["b"]);
    assert_eq!(stats.failed, 0);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_record_key_survives_forwarding() {
    let transport = MemoryTransport::new("orders");
    transport.push_keyed(Some(b"customer-7".to_vec()), "created");
    transport.push("unkeyed");
    let (relay, _) = common::start_relay(&common::fast_config(), transport.clone());

    common::wait_until(LIMIT, || transport.committed() == Some(1)).await;
    relay.stop().await;

    let sent = transport.sent();
    assert_eq!(sent[0].key(), Some(b"customer-7".as_slice()));
    assert_eq!(sent[0].value(), b"created");
    assert_eq!(sent[1].key(), None);
}
