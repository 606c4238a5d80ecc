//! In-process partition log.
//!
//! Backs the relay with a vector of records instead of a broker. Sends can
//! be scripted to fail, and every call is journaled so tests can assert on
//! the exact interleaving of receive, send and commit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::transport::{
    Ack, ErrorKind, PartitionId, Record, Transport, TransportError, TransportResult,
};

/// A transport call as observed by [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Receive(i64),
    Send(i64),
    Commit(i64),
    Pause,
    Resume,
}

#[derive(Debug, Default)]
struct MemoryLog {
    source: Vec<Record>,
    position: usize,
    destination: Vec<Record>,
    committed: Option<i64>,
    paused: bool,
    pause_calls: usize,
    resume_calls: usize,
    scripted: VecDeque<Option<ErrorKind>>,
    failing: Option<ErrorKind>,
    failing_receives: Option<ErrorKind>,
    failing_commits: Option<ErrorKind>,
    send_delay: Option<Duration>,
    journal: Vec<Operation>,
}

/// Shared, cloneable in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    partition: PartitionId,
    inner: Arc<Mutex<MemoryLog>>,
}

impl MemoryTransport {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            partition: PartitionId::new(topic, 0),
            inner: Arc::new(Mutex::new(MemoryLog::default())),
        }
    }

    fn log(&self) -> MutexGuard<'_, MemoryLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record to the source partition.
    pub fn push(&self, value: impl Into<Vec<u8>>) -> i64 {
        self.push_keyed(None, value)
    }

    pub fn push_keyed(&self, key: Option<Vec<u8>>, value: impl Into<Vec<u8>>) -> i64 {
        let mut log = self.log();
        let offset = log.source.len() as i64;
        let record = Record::new(self.partition.clone(), offset, key, value.into());
        log.source.push(record);
        offset
    }

    /// Queue per-send results: `None` succeeds, `Some(kind)` fails with `kind`.
    /// Scripted results take precedence over [`fail_sends`](Self::fail_sends).
    pub fn script_sends(&self, results: impl IntoIterator<Item = Option<ErrorKind>>) {
        self.log().scripted.extend(results);
    }

    /// Make every unscripted send fail with `kind`, or succeed again with `None`.
    pub fn fail_sends(&self, kind: Option<ErrorKind>) {
        self.log().failing = kind;
    }

    /// Make every receive fail with `kind` without consuming a record.
    pub fn fail_receives(&self, kind: Option<ErrorKind>) {
        self.log().failing_receives = kind;
    }

    /// Make every commit fail with `kind`. Failed commits are still journaled.
    pub fn fail_commits(&self, kind: Option<ErrorKind>) {
        self.log().failing_commits = kind;
    }

    /// Delay each send, e.g. to trip the relay's send timeout.
    pub fn delay_sends(&self, delay: Option<Duration>) {
        self.log().send_delay = delay;
    }

    /// Records delivered to the destination partition.
    pub fn sent(&self) -> Vec<Record> {
        self.log().destination.clone()
    }

    /// Values delivered to the destination partition, as UTF-8.
    pub fn sent_values(&self) -> Vec<String> {
        self.log()
            .destination
            .iter()
            .map(|r| String::from_utf8_lossy(r.value()).into_owned())
            .collect()
    }

    /// Highest committed source offset.
    pub fn committed(&self) -> Option<i64> {
        self.log().committed
    }

    pub fn is_paused(&self) -> bool {
        self.log().paused
    }

    /// Number of pause and resume calls, in that order.
    pub fn toggle_counts(&self) -> (usize, usize) {
        let log = self.log();
        (log.pause_calls, log.resume_calls)
    }

    pub fn journal(&self) -> Vec<Operation> {
        self.log().journal.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&self, timeout: Duration) -> TransportResult<Option<Record>> {
        {
            let mut log = self.log();
            if let Some(kind) = log.failing_receives {
                return Err(TransportError::new(kind, format!("injected {} failure", kind)));
            }
            if !log.paused && log.position < log.source.len() {
                let record = log.source[log.position].clone();
                log.position += 1;
                log.journal.push(Operation::Receive(record.offset()));
                return Ok(Some(record));
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn send(&self, record: &Record) -> TransportResult<Ack> {
        let delay = self.log().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log();
        log.journal.push(Operation::Send(record.offset()));
        let failure = match log.scripted.pop_front() {
            Some(scripted) => scripted,
            None => log.failing,
        };
        if let Some(kind) = failure {
            return Err(TransportError::new(kind, format!("injected {} failure", kind)));
        }

        let destination_offset = log.destination.len() as i64;
        log.destination.push(record.clone());
        Ok(Ack {
            destination_offset: Some(destination_offset),
        })
    }

    async fn commit(&self, record: &Record) -> TransportResult<()> {
        let mut log = self.log();
        log.journal.push(Operation::Commit(record.offset()));
        if let Some(kind) = log.failing_commits {
            return Err(TransportError::new(kind, format!("injected {} failure", kind)));
        }
        log.committed = Some(log.committed.map_or(record.offset(), |c| c.max(record.offset())));
        Ok(())
    }

    async fn pause_intake(&self) -> TransportResult<()> {
        let mut log = self.log();
        log.pause_calls += 1;
        if !log.paused {
            log.paused = true;
            log.journal.push(Operation::Pause);
        }
        Ok(())
    }

    async fn resume_intake(&self) -> TransportResult<()> {
        let mut log = self.log();
        log.resume_calls += 1;
        if log.paused {
            log.paused = false;
            log.journal.push(Operation::Resume);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_receive_in_order_then_empty() {
        let transport = MemoryTransport::new("in");
        transport.push("a");
        transport.push("b");

        let first = transport.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = transport.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!((first.offset(), first.value()), (0, b"a".as_slice()));
        assert_eq!((second.offset(), second.value()), (1, b"b".as_slice()));
        assert!(transport.receive(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_intake_yields_nothing() {
        let transport = MemoryTransport::new("in");
        transport.push("a");
        transport.pause_intake().await.unwrap();
        transport.pause_intake().await.unwrap();

        assert!(transport.receive(Duration::from_millis(10)).await.unwrap().is_none());
        assert_eq!(transport.journal(), vec![Operation::Pause]);

        transport.resume_intake().await.unwrap();
        assert!(transport.receive(Duration::from_millis(10)).await.unwrap().is_some());
        assert_eq!(transport.toggle_counts(), (2, 1));
    }

    #[tokio::test]
    async fn test_scripted_sends() {
        let transport = MemoryTransport::new("in");
        transport.push("a");
        let record = transport.receive(Duration::ZERO).await.unwrap().unwrap();

        transport.script_sends([Some(ErrorKind::Network), None]);
        let err = transport.send(&record).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(transport.send(&record).await.is_ok());
        assert_eq!(transport.sent_values(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let transport = MemoryTransport::new("in");
        transport.push("a");
        transport.push("b");
        let a = transport.receive(Duration::ZERO).await.unwrap().unwrap();
        let b = transport.receive(Duration::ZERO).await.unwrap().unwrap();

        transport.commit(&b).await.unwrap();
        transport.commit(&a).await.unwrap();
        transport.commit(&b).await.unwrap();
        assert_eq!(transport.committed(), Some(1));
    }

    #[tokio::test]
    async fn test_injected_receive_and_commit_failures() {
        let transport = MemoryTransport::new("in");
        transport.push("a");

        transport.fail_receives(Some(ErrorKind::Network));
        let err = transport.receive(Duration::ZERO).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);

        transport.fail_receives(None);
        let record = transport.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(record.offset(), 0);

        transport.fail_commits(Some(ErrorKind::Timeout));
        assert!(transport.commit(&record).await.is_err());
        assert_eq!(transport.committed(), None);
        assert_eq!(transport.journal(), vec![Operation::Receive(0), Operation::Commit(0)]);
    }
}
