//! Producer gateway.
//!
//! Publishes serialized domain events keyed by their entity id. The key
//! decides the partition, which is what gives the consumer runtime its
//! per-entity ordering. Publish failures are logged and returned to the
//! caller; retrying them is the caller's decision.

use std::sync::Arc;

use tracing::{debug, error};

use crate::broker::{Delivery, OutboundRecord, Publisher};
use crate::error::PublishError;

#[derive(Clone)]
pub struct ProducerGateway {
    publisher: Arc<dyn Publisher>,
    topic: String,
}

impl ProducerGateway {
    pub fn new(publisher: Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `payload` under `key` to the gateway's topic. The key must
    /// not be empty.
    pub async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<Delivery, PublishError> {
        if key.is_empty() {
            error!("Refusing to publish to {} without a key", self.topic);
            return Err(PublishError::InvalidKey);
        }
        self.publish_record(OutboundRecord::new(self.topic.clone(), key, payload))
            .await
    }

    /// Publish a fully specified record, e.g. to the dead-letter topic.
    /// The key is taken as given; an empty key publishes a keyless record.
    pub async fn publish_record(&self, record: OutboundRecord) -> Result<Delivery, PublishError> {
        let key = record.key.clone();
        match self.publisher.publish(record).await {
            Ok(delivery) => {
                debug!(
                    "Published record {key} to {}/{}@{}",
                    delivery.topic, delivery.partition, delivery.offset
                );
                Ok(delivery)
            }
            Err(e) => {
                error!("Error while publishing record {key}: {e}");
                Err(e)
            }
        }
    }
}
