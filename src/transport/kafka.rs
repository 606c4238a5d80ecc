//! Kafka transport.
//!
//! # Configuration
//! - `enable.auto.commit=false`: offsets are committed by the relay, only
//!   after the record reached the target topic
//! - `auto.offset.reset=earliest`: a fresh consumer group starts at the
//!   beginning of the source topic
//! - Pause/resume act on the consumer's current assignment
//! - Commits are synchronous broker round-trips and run on the blocking pool

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::config::KafkaTransportConfig;
use crate::transport::{
    Ack, ErrorKind, PartitionId, Record, Transport, TransportError, TransportResult,
};

/// Map a client error onto the relay's classification.
///
/// Errors that describe the record itself are `Application`; everything
/// else points at the cluster and is `Network`.
fn classify(err: &KafkaError) -> ErrorKind {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            ErrorKind::Timeout
        }
        Some(RDKafkaErrorCode::MessageSizeTooLarge)
        | Some(RDKafkaErrorCode::InvalidMessage)
        | Some(RDKafkaErrorCode::InvalidMessageSize)
        | Some(RDKafkaErrorCode::InvalidRecord) => ErrorKind::Application,
        _ => ErrorKind::Network,
    }
}

fn transport_error(context: &str, err: KafkaError) -> TransportError {
    TransportError::new(classify(&err), format!("{}: {}", context, err))
}

/// Offsets to commit once `record` was delivered: the next one to read.
fn commit_offsets(record: &Record) -> TransportResult<TopicPartitionList> {
    let partition = record.partition();
    let mut offsets = TopicPartitionList::new();
    offsets
        .add_partition_offset(&partition.topic, partition.partition, Offset::Offset(record.offset() + 1))
        .map_err(|e| transport_error("invalid commit offset", e))?;
    Ok(offsets)
}

/// Consumer/producer pair relaying one topic into another.
pub struct KafkaTransport {
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    target_topic: String,
    send_timeout: Duration,
}

impl KafkaTransport {
    pub fn connect(config: &KafkaTransportConfig, send_timeout: Duration) -> TransportResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()
            .map_err(|e| transport_error("failed to create consumer", e))?;

        consumer
            .subscribe(&[config.source_topic.as_str()])
            .map_err(|e| transport_error("failed to subscribe", e))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| transport_error("failed to create producer", e))?;

        tracing::info!(
            bootstrap_servers = %config.bootstrap_servers,
            source_topic = %config.source_topic,
            target_topic = %config.target_topic,
            consumer_group = %config.consumer_group,
            "Kafka transport connected"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            producer,
            target_topic: config.target_topic.clone(),
            send_timeout,
        })
    }

    fn assignment(&self) -> TransportResult<TopicPartitionList> {
        self.consumer
            .assignment()
            .map_err(|e| transport_error("failed to read assignment", e))
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn receive(&self, timeout: Duration) -> TransportResult<Option<Record>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(transport_error("consume failed", e)),
            Ok(Ok(message)) => Ok(Some(Record::new(
                PartitionId::new(message.topic(), message.partition()),
                message.offset(),
                message.key().map(<[u8]>::to_vec),
                message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            ))),
        }
    }

    async fn send(&self, record: &Record) -> TransportResult<Ack> {
        let mut message = FutureRecord::<[u8], [u8]>::to(&self.target_topic).payload(record.value());
        if let Some(key) = record.key() {
            message = message.key(key);
        }

        match self.producer.send(message, Timeout::After(self.send_timeout)).await {
            Ok((_partition, offset)) => Ok(Ack {
                destination_offset: Some(offset),
            }),
            Err((e, _message)) => Err(transport_error("produce failed", e)),
        }
    }

    async fn commit(&self, record: &Record) -> TransportResult<()> {
        let offsets = commit_offsets(record)?;
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| TransportError::network(format!("commit task failed: {}", e)))?
            .map_err(|e| transport_error("commit failed", e))
    }

    async fn pause_intake(&self) -> TransportResult<()> {
        let assignment = self.assignment()?;
        self.consumer
            .pause(&assignment)
            .map_err(|e| transport_error("pause failed", e))
    }

    async fn resume_intake(&self) -> TransportResult<()> {
        let assignment = self.assignment()?;
        self.consumer
            .resume(&assignment)
            .map_err(|e| transport_error("resume failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let timeout = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        assert_eq!(classify(&timeout), ErrorKind::Timeout);

        let too_large = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
        assert_eq!(classify(&too_large), ErrorKind::Application);

        let transport = KafkaError::MessageProduction(RDKafkaErrorCode::BrokerTransportFailure);
        assert_eq!(classify(&transport), ErrorKind::Network);
    }

    #[test]
    fn test_commit_offsets_point_past_record() {
        let record = Record::new(PartitionId::new("source", 2), 41, None, b"v".to_vec());
        let offsets = commit_offsets(&record).unwrap();
        let entry = offsets.find_partition("source", 2).unwrap();
        assert_eq!(entry.offset(), Offset::Offset(42));
        assert_eq!(offsets.count(), 1);
    }
}
