//! Log transport subsystem.
//!
//! # Data Flow
//! ```text
//! source partition
//!     → receive(timeout)      (one record at a time, in offset order)
//!     → relay loop            (guarded forward)
//!     → send(record)          (destination partition)
//!     → commit(record)        (durable read offset, only after send)
//! ```
//!
//! # Design Decisions
//! - The relay only sees the `Transport` trait; connection setup,
//!   partition assignment and serialization stay inside each backend
//! - Every error carries an `ErrorKind` so the breaker can tell a sick
//!   downstream apart from a bad record
//! - `commit`, `pause_intake` and `resume_intake` are idempotent

pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileTransport;
#[cfg(feature = "kafka")]
pub use kafka::KafkaTransport;
pub use memory::MemoryTransport;

/// Identity of one ordered log partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionId {
    pub topic: String,
    pub partition: i32,
}

impl PartitionId {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A record read from the source partition.
///
/// Records are immutable once read; the relay forwards key and value
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Option<Vec<u8>>,
    value: Vec<u8>,
    offset: i64,
    partition: PartitionId,
}

impl Record {
    pub fn new(partition: PartitionId, offset: i64, key: Option<Vec<u8>>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            offset,
            partition,
        }
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Position of this record in its source partition.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }
}

/// Downstream acknowledgement of a forwarded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Where the record landed, when the destination reports it.
    pub destination_offset: Option<i64>,
}

/// Classification tag carried by every transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Connectivity or broker-side trouble; the downstream may be unhealthy.
    Network,
    /// The operation exceeded its deadline.
    Timeout,
    /// The record itself was rejected (malformed, too large, ...).
    Application,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Application => "application",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a transport operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("operation timed out after {:?}", after))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Source/destination pair the relay reads from and writes to.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait up to `timeout` for the next record. `Ok(None)` when nothing
    /// arrived or intake is paused.
    async fn receive(&self, timeout: Duration) -> TransportResult<Option<Record>>;

    /// Publish the record to the destination partition.
    async fn send(&self, record: &Record) -> TransportResult<Ack>;

    /// Durably advance the read offset past `record`.
    async fn commit(&self, record: &Record) -> TransportResult<()>;

    /// Stop delivering records from `receive`.
    async fn pause_intake(&self) -> TransportResult<()>;

    /// Resume delivering records from `receive`.
    async fn resume_intake(&self) -> TransportResult<()>;
}
