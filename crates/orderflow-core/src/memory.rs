//! In-process broker.
//!
//! A partitioned append log with a single consumer group, implementing
//! both broker traits. Used by the test suites and for local dry runs of
//! the pipeline without Kafka. Fault switches let tests simulate an
//! unavailable broker or a failing topic.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use orderflow_types::Envelope;
use tokio::sync::Notify;

use crate::broker::{Delivery, OutboundRecord, Publisher, Subscriber};
use crate::error::{BrokerError, PublishError};
use crate::partition::partition_for_key;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// A record as stored in the in-memory log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl StoredRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    subscription: Option<String>,
    /// Next offset to hand out per (topic, partition)
    positions: HashMap<(String, i32), i64>,
    /// Last processed offset per (topic, partition)
    committed: HashMap<(String, i32), i64>,
    commit_log: Vec<(String, i32, i64)>,
    failing_topics: HashSet<String>,
    unavailable: bool,
}

pub struct MemoryBroker {
    state: Mutex<State>,
    notify: Notify,
    poll_timeout: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_poll_timeout(DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            poll_timeout,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a topic. Re-declaring an existing topic is a no-op.
    pub fn create_topic(&self, topic: &str, partitions: i32) {
        let mut state = self.state();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
    }

    /// Make every publish to `topic` fail until switched back.
    pub fn fail_publishes_to(&self, topic: &str, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_topics.insert(topic.to_string());
        } else {
            state.failing_topics.remove(topic);
        }
    }

    /// Make polls fail as if the broker connection was lost.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
        self.notify.notify_waiters();
    }

    /// All records of a topic, partition by partition in offset order.
    pub fn records(&self, topic: &str) -> Vec<StoredRecord> {
        self.state()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state()
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Every commit in call order.
    pub fn commits(&self) -> Vec<(String, i32, i64)> {
        self.state().commit_log.clone()
    }

    fn fetch(&self, max: usize) -> Result<Vec<Envelope>, BrokerError> {
        let mut state = self.state();
        if state.unavailable {
            return Err(BrokerError::Unavailable("memory broker switched off".to_string()));
        }
        let topic = state
            .subscription
            .clone()
            .ok_or(BrokerError::NotSubscribed)?;
        let partition_count = state
            .topics
            .get(&topic)
            .map(Vec::len)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.clone()))?;

        let mut batch = Vec::new();
        for partition in 0..partition_count as i32 {
            let position_key = (topic.clone(), partition);
            let mut position = state.positions.get(&position_key).copied().unwrap_or(0);
            let log = &state.topics[&topic][partition as usize];

            while batch.len() < max {
                let Some(record) = log.get(position as usize) else {
                    break;
                };
                batch.push(Envelope::received(
                    record.key.clone(),
                    record.payload.clone(),
                    record.topic.clone(),
                    record.partition,
                    record.offset,
                ));
                position += 1;
            }
            state.positions.insert(position_key, position);
        }
        Ok(batch)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<Delivery, PublishError> {
        let delivery = {
            let mut state = self.state();
            if state.failing_topics.contains(&record.topic) {
                return Err(PublishError::Broker(format!(
                    "topic {} is rejecting writes",
                    record.topic
                )));
            }
            let partitions = state
                .topics
                .get_mut(&record.topic)
                .ok_or_else(|| PublishError::Broker(format!("unknown topic {}", record.topic)))?;

            let partition = match record.partition {
                Some(partition) if (0..partitions.len() as i32).contains(&partition) => partition,
                Some(partition) => {
                    return Err(PublishError::Broker(format!(
                        "partition {partition} out of range for {}",
                        record.topic
                    )))
                }
                None => partition_for_key(record.key.as_bytes(), partitions.len() as i32),
            };

            let log = &mut partitions[partition as usize];
            let offset = log.len() as i64;
            log.push(StoredRecord {
                topic: record.topic.clone(),
                partition,
                offset,
                key: record.key,
                payload: record.payload,
                headers: record.headers,
            });
            Delivery {
                topic: record.topic,
                partition,
                offset,
            }
        };
        self.notify.notify_waiters();
        Ok(delivery)
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn subscribe(&self, topic: &str, _group_id: &str) -> Result<(), BrokerError> {
        let mut state = self.state();
        let partition_count = state
            .topics
            .get(topic)
            .map(Vec::len)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        // A new member resumes after the group's committed offsets.
        for partition in 0..partition_count as i32 {
            let key = (topic.to_string(), partition);
            let resume_at = state.committed.get(&key).map_or(0, |offset| offset + 1);
            state.positions.insert(key, resume_at);
        }
        state.subscription = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&self, max: usize) -> Result<Vec<Envelope>, BrokerError> {
        let notified = self.notify.notified();
        let batch = self.fetch(max)?;
        if !batch.is_empty() {
            return Ok(batch);
        }
        let _ = tokio::time::timeout(self.poll_timeout, notified).await;
        self.fetch(max)
    }

    async fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.unavailable {
            return Err(BrokerError::Commit("memory broker switched off".to_string()));
        }
        state
            .committed
            .insert((topic.to_string(), partition), offset);
        state.commit_log.push((topic.to_string(), partition, offset));
        Ok(())
    }

    async fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            let position = state
                .positions
                .entry((topic.to_string(), partition))
                .or_insert(0);
            *position = (*position).min(offset);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
