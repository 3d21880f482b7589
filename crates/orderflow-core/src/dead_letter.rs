//! Dead-letter routing.

use orderflow_types::{DeadLetterRecord, Envelope};
use tracing::{error, warn};

use crate::broker::{Delivery, OutboundRecord};
use crate::error::PublishError;
use crate::handler::ErrorKind;
use crate::producer::ProducerGateway;

/// Republishes terminally-failed envelopes to the dead-letter topic.
///
/// The record keeps the original key, so every failure for one entity can
/// be found together. The partition is left to the broker. The caller
/// commits the original offset only when this returns `Ok`.
#[derive(Clone)]
pub struct DeadLetterRouter {
    gateway: ProducerGateway,
    dlq_topic: String,
}

impl DeadLetterRouter {
    pub fn new(gateway: ProducerGateway, dlq_topic: impl Into<String>) -> Self {
        Self {
            gateway,
            dlq_topic: dlq_topic.into(),
        }
    }

    pub fn dlq_topic(&self) -> &str {
        &self.dlq_topic
    }

    pub async fn route(
        &self,
        envelope: &Envelope,
        reason: &str,
        kind: ErrorKind,
    ) -> Result<Delivery, PublishError> {
        let record = DeadLetterRecord::from_envelope(envelope, reason, kind.as_str());
        let payload = record
            .to_json_bytes()
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let outbound = OutboundRecord::new(self.dlq_topic.clone(), envelope.key.clone(), payload)
            .with_headers(record.headers());

        match self.gateway.publish_record(outbound).await {
            Ok(delivery) => {
                warn!(
                    "Dead-lettered {} (key {}) after {} attempts: {reason}",
                    envelope.position(),
                    envelope.key,
                    record.attempts_made
                );
                Ok(delivery)
            }
            Err(e) => {
                error!(
                    "Failed to dead-letter {} (key {}): {e}",
                    envelope.position(),
                    envelope.key
                );
                Err(e)
            }
        }
    }
}
