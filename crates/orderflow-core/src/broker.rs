//! Broker client capability.
//!
//! The pipeline only talks to the log through these traits. Consumer-group
//! membership and partition rebalancing belong to the implementation; the
//! core never performs them itself.
//!
//! Implementations:
//! - `MemoryBroker` (this crate) - in-process log for tests and dry runs
//! - `KafkaBroker` (orderflow-kafka) - rdkafka producer and consumer

use async_trait::async_trait;
use orderflow_types::Envelope;

use crate::error::{BrokerError, PublishError};

/// A record to append to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
    /// Explicit partition; `None` lets the broker hash the key.
    pub partition: Option<i32>,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            headers: Vec::new(),
            partition: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Where the broker placed an appended record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Append one record and wait for the broker's acknowledgement.
    async fn publish(&self, record: OutboundRecord) -> Result<Delivery, PublishError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Join `group_id` and start receiving records from `topic`.
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<(), BrokerError>;

    /// Pull up to `max` envelopes.
    ///
    /// Returns an empty batch when nothing arrives within the
    /// implementation's poll timeout.
    async fn poll(&self, max: usize) -> Result<Vec<Envelope>, BrokerError>;

    /// Mark `offset` as processed; after a restart consumption resumes at
    /// `offset + 1`.
    async fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError>;

    /// Move the fetch position back so that `offset` is delivered again by
    /// a later poll.
    async fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError>;
}

/// A broker usable for both publishing and consuming.
pub trait BrokerClient: Publisher + Subscriber {}

impl<T: Publisher + Subscriber> BrokerClient for T {}
