//! Dead-letter record.
//!
//! Created exactly once per terminally-failed logical message and written
//! to the dead-letter topic under the original key. The pipeline never
//! reads it back; operators inspect or replay it.

use crate::envelope::Envelope;
use crate::error::Result;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HEADER_ORIGINAL_TOPIC: &str = "dlq-original-topic";
pub const HEADER_ORIGINAL_PARTITION: &str = "dlq-original-partition";
pub const HEADER_ORIGINAL_OFFSET: &str = "dlq-original-offset";
pub const HEADER_FAILURE_REASON: &str = "dlq-failure-reason";
pub const HEADER_ATTEMPTS_MADE: &str = "dlq-attempts-made";

/// Header names attached to every dead-lettered record.
pub const DLQ_HEADER_NAMES: [&str; 5] = [
    HEADER_ORIGINAL_TOPIC,
    HEADER_ORIGINAL_PARTITION,
    HEADER_ORIGINAL_OFFSET,
    HEADER_FAILURE_REASON,
    HEADER_ATTEMPTS_MADE,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub original_key: String,
    pub original_topic: String,
    pub original_partition: i32,
    pub original_offset: i64,
    pub failure_reason: String,
    /// Machine-readable error kind, e.g. `deserialization`
    pub error_kind: String,
    pub attempts_made: u32,
    pub timestamp: DateTime<Utc>,
    /// Original record value, base64 encoded
    pub original_payload: String,
}

impl DeadLetterRecord {
    /// Build the record for an envelope on its final attempt.
    pub fn from_envelope(
        envelope: &Envelope,
        failure_reason: impl Into<String>,
        error_kind: impl Into<String>,
    ) -> Self {
        Self {
            original_key: envelope.key.clone(),
            original_topic: envelope.source_topic.clone(),
            original_partition: envelope.partition,
            original_offset: envelope.offset,
            failure_reason: failure_reason.into(),
            error_kind: error_kind.into(),
            attempts_made: envelope.attempts_made(),
            timestamp: Utc::now(),
            original_payload: base64::engine::general_purpose::STANDARD.encode(&envelope.payload),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Metadata headers mirroring the record fields.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            (HEADER_ORIGINAL_TOPIC.to_string(), self.original_topic.clone()),
            (
                HEADER_ORIGINAL_PARTITION.to_string(),
                self.original_partition.to_string(),
            ),
            (
                HEADER_ORIGINAL_OFFSET.to_string(),
                self.original_offset.to_string(),
            ),
            (HEADER_FAILURE_REASON.to_string(), self.failure_reason.clone()),
            (
                HEADER_ATTEMPTS_MADE.to_string(),
                self.attempts_made.to_string(),
            ),
        ]
    }

    /// Decode the original record value.
    pub fn original_payload_bytes(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.original_payload)
    }
}
