use std::time::Duration;

use clap::Args;
use rdkafka::ClientConfig;

use crate::error::{Error, Result};

/// Connection settings shared by the producer, consumer and admin clients.
#[derive(Args, Clone, Debug)]
pub struct KafkaConfig {
    /// Kafka brokers (comma-separated, e.g., "localhost:9092")
    #[arg(
        long = "kafka-brokers",
        env = "KAFKA_BROKERS",
        default_value = "localhost:9092",
        global = true
    )]
    pub brokers: String,

    /// Client ID reported by the producer
    #[arg(long, env = "PRODUCER_CLIENT_ID", default_value = "order-producer", global = true)]
    pub client_id: String,

    /// How long the producer keeps trying to deliver a record, in milliseconds
    #[arg(long, env = "DELIVERY_TIMEOUT_MS", default_value_t = 30000, global = true)]
    pub delivery_timeout_ms: u64,

    /// Where a consumer group without committed offsets starts ("earliest" or "latest")
    #[arg(long, env = "AUTO_OFFSET_RESET", default_value = "earliest", global = true)]
    pub auto_offset_reset: String,

    /// Consumer session timeout in milliseconds
    #[arg(long, env = "SESSION_TIMEOUT_MS", default_value = "6000", global = true)]
    pub session_timeout_ms: String,

    /// How long a poll waits for the first record, in milliseconds
    #[arg(long, env = "POLL_TIMEOUT_MS", default_value_t = 100, global = true)]
    pub poll_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "order-producer".to_string(),
            delivery_timeout_ms: 30000,
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: "6000".to_string(),
            poll_timeout_ms: 100,
        }
    }
}

impl KafkaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(Error::InvalidConfig("brokers must not be empty".to_string()));
        }
        if !matches!(self.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(Error::InvalidConfig(format!(
                "auto offset reset must be \"earliest\" or \"latest\", got \"{}\"",
                self.auto_offset_reset
            )));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "delivery timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Producer settings. `murmur2_random` hashes keys the way the Java
    /// client does, so all events of one entity share a partition.
    pub fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("partitioner", "murmur2_random")
            .set("message.timeout.ms", self.delivery_timeout_ms.to_string());
        config
    }

    /// Consumer settings. Offsets are committed by the runtime, never
    /// automatically.
    pub fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set("enable.partition.eof", "false");
        config
    }

    pub fn admin_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config
    }
}
