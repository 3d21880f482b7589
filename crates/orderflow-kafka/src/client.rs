use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use orderflow_core::{BrokerError, Delivery, OutboundRecord, PublishError, Publisher, Subscriber};
use orderflow_types::Envelope;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Message as RdkafkaMessage, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::{publish_error, Result};

/// Wait for each record after the first in a poll.
const FOLLOW_UP_WAIT: Duration = Duration::from_millis(10);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// rdkafka-backed broker client.
///
/// The producer is created up front. The consumer joins its group on
/// [`Subscriber::subscribe`], so an API-only process never becomes a
/// group member.
pub struct KafkaBroker {
    config: KafkaConfig,
    producer: FutureProducer,
    consumer: OnceLock<StreamConsumer>,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> Result<Self> {
        config.validate()?;
        let producer: FutureProducer = config.producer_config().create()?;
        info!(
            "Kafka producer {} connected to {}",
            config.client_id, config.brokers
        );
        Ok(Self {
            config,
            producer,
            consumer: OnceLock::new(),
        })
    }

    fn consumer(&self) -> std::result::Result<&StreamConsumer, BrokerError> {
        self.consumer.get().ok_or(BrokerError::NotSubscribed)
    }

    fn envelope(msg: &BorrowedMessage<'_>) -> Envelope {
        let key = msg
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();
        Envelope::received(
            key,
            msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            msg.topic(),
            msg.partition(),
            msg.offset(),
        )
    }
}

fn owned_headers(headers: &[(String, String)]) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new(), |acc, (name, value)| {
            acc.insert(Header {
                key: name.as_str(),
                value: Some(value.as_str()),
            })
        })
}

#[async_trait]
impl Publisher for KafkaBroker {
    async fn publish(&self, record: OutboundRecord) -> std::result::Result<Delivery, PublishError> {
        let mut future_record = FutureRecord::to(&record.topic).payload(&record.payload);
        // Keyless records stay keyless, as they arrived.
        if !record.key.is_empty() {
            future_record = future_record.key(record.key.as_str());
        }
        if !record.headers.is_empty() {
            future_record = future_record.headers(owned_headers(&record.headers));
        }
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        let (partition, offset) = self
            .producer
            .send(future_record, Timeout::After(self.config.delivery_timeout()))
            .await
            .map_err(|(err, _)| publish_error(err))?;

        Ok(Delivery {
            topic: record.topic,
            partition,
            offset,
        })
    }
}

#[async_trait]
impl Subscriber for KafkaBroker {
    async fn subscribe(&self, topic: &str, group_id: &str) -> std::result::Result<(), BrokerError> {
        if self.consumer.get().is_none() {
            let consumer: StreamConsumer = self
                .config
                .consumer_config(group_id)
                .create()
                .map_err(|e| BrokerError::Unavailable(format!("Failed to create consumer: {e}")))?;
            // Lost race: another caller installed its consumer first.
            let _ = self.consumer.set(consumer);
        }

        self.consumer()?
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Unavailable(format!("Failed to subscribe to topic: {e}")))?;
        info!("Subscribed to {topic} as group {group_id}");
        Ok(())
    }

    /// Wait up to the poll timeout for the first record, then keep
    /// collecting while more arrive within a few milliseconds.
    async fn poll(&self, max: usize) -> std::result::Result<Vec<Envelope>, BrokerError> {
        let consumer = self.consumer()?;
        let mut batch = Vec::new();

        match tokio::time::timeout(self.config.poll_timeout(), consumer.recv()).await {
            Ok(Ok(msg)) => batch.push(Self::envelope(&msg)),
            Ok(Err(e)) => return Err(BrokerError::Poll(format!("Error receiving message: {e}"))),
            Err(_) => return Ok(batch),
        }

        while batch.len() < max {
            match tokio::time::timeout(FOLLOW_UP_WAIT, consumer.recv()).await {
                Ok(Ok(msg)) => batch.push(Self::envelope(&msg)),
                Ok(Err(e)) => {
                    return Err(BrokerError::Poll(format!("Error receiving message: {e}")))
                }
                Err(_) => break,
            }
        }

        debug!("Received {} messages", batch.len());
        Ok(batch)
    }

    async fn commit(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> std::result::Result<(), BrokerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| BrokerError::Commit(format!("Failed to add partition offset: {e}")))?;

        self.consumer()?
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| BrokerError::Commit(e.to_string()))
    }

    async fn rewind(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> std::result::Result<(), BrokerError> {
        self.consumer()?
            .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
            .map_err(|e| BrokerError::Rewind(e.to_string()))?;
        debug!("Rewound {topic}/{partition} to offset {offset}");
        Ok(())
    }
}
