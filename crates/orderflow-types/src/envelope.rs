//! Message envelope.
//!
//! An [`Envelope`] wraps one record pulled from the log together with its
//! delivery metadata. It is created at poll time and lives until the
//! record reaches a terminal state (committed, or dead-lettered and then
//! committed). Nothing here is ever persisted.

use chrono::{DateTime, Utc};

/// One unit of work moving through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Domain entity id used as the record key
    pub key: String,
    /// Serialized domain event
    pub payload: Vec<u8>,
    /// Topic the record was read from
    pub source_topic: String,
    /// Partition the record was read from
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Zero-based attempt counter within this consumer session
    pub attempt: u32,
    /// When this process first pulled the record
    pub first_seen_at: DateTime<Utc>,
}

impl Envelope {
    /// Create a fresh envelope at poll time, with `attempt = 0`.
    pub fn received(
        key: impl Into<String>,
        payload: Vec<u8>,
        source_topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            source_topic: source_topic.into(),
            partition,
            offset,
            attempt: 0,
            first_seen_at: Utc::now(),
        }
    }

    /// The same envelope, redelivered for one more attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    /// Number of processing attempts including the current one.
    pub fn attempts_made(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// `topic/partition@offset`, for log lines.
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.source_topic, self.partition, self.offset)
    }
}
