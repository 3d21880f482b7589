//! Process configuration.
//!
//! Parsed once from CLI flags with environment fallbacks, validated into an
//! [`AppConfig`], and handed to each component's constructor by value.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use orderflow_core::{ErrorKind, FailureClassifier, RetryPolicy, RuntimeSettings};
use orderflow_kafka::{KafkaConfig, TopicLayout};

pub mod duration;

pub use duration::parse_duration;

/// Topic names and layout.
#[derive(Args, Clone, Debug)]
pub struct TopicOpts {
    /// Topic order events are published to
    #[arg(long, env = "ORDERS_TOPIC", default_value = "orders", global = true)]
    pub orders_topic: String,

    /// Dead-letter topic for orders that could not be processed
    #[arg(long, env = "ORDERS_DLQ_TOPIC", default_value = "orders-dlq", global = true)]
    pub dlq_topic: String,

    /// Partitions of the orders topic
    #[arg(long, env = "PARTITIONS", default_value_t = 5, global = true)]
    pub partitions: i32,

    /// Replication factor of both topics
    #[arg(long, env = "REPLICATION_FACTOR", default_value_t = 3, global = true)]
    pub replication_factor: i32,
}

/// Consumer runtime and retry settings.
#[derive(Args, Clone, Debug)]
pub struct ConsumerOpts {
    /// Consumer group ID
    #[arg(long, env = "CONSUMER_GROUP_ID", default_value = "order-consumers", global = true)]
    pub group_id: String,

    /// Retries after the first attempt before an order is dead-lettered
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 5, global = true)]
    pub retry_attempts: u32,

    /// Fixed wait between two attempts of the same order, in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 3000, global = true)]
    pub retry_backoff_ms: u64,

    /// Number of consumer workers
    #[arg(long, env = "CONSUMER_CONCURRENCY", default_value_t = 3, global = true)]
    pub concurrency: usize,

    /// Error kinds that skip retries (comma-separated)
    #[arg(
        long,
        global = true,
        env = "TERMINAL_ERROR_KINDS",
        value_delimiter = ',',
        default_value = "input_malformed,type_mismatch,deserialization,permanent"
    )]
    pub terminal_error_kinds: Vec<String>,

    /// How long shutdown waits for in-flight orders (e.g. "30s", "500ms")
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "30s", global = true)]
    pub shutdown_grace: String,

    /// Maximum number of records requested per poll
    #[arg(long, env = "POLL_BATCH_SIZE", default_value_t = 100, global = true)]
    pub poll_batch_size: usize,

    /// Records held for busy workers before polling pauses
    #[arg(long, env = "MAX_BUFFERED", default_value_t = 1000, global = true)]
    pub max_buffered: usize,
}

#[derive(Args, Clone, Debug)]
pub struct ApiOpts {
    /// Address the order API listens on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080", global = true)]
    pub listen_addr: SocketAddr,
}

/// Every flag the binary understands.
#[derive(Args, Clone, Debug)]
pub struct PipelineOpts {
    #[command(flatten)]
    pub kafka: KafkaConfig,

    #[command(flatten)]
    pub topics: TopicOpts,

    #[command(flatten)]
    pub consumer: ConsumerOpts,

    #[command(flatten)]
    pub api: ApiOpts,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kafka: KafkaConfig,
    pub topics: TopicLayout,
    pub retry: RetryPolicy,
    pub classifier: FailureClassifier,
    pub runtime: RuntimeSettings,
    pub listen_addr: SocketAddr,
}

impl AppConfig {
    pub fn from_opts(opts: PipelineOpts) -> anyhow::Result<Self> {
        opts.kafka.validate().context("Invalid Kafka settings")?;

        let topics = TopicLayout {
            topic: opts.topics.orders_topic,
            dlq_topic: opts.topics.dlq_topic,
            partitions: opts.topics.partitions,
            replication_factor: opts.topics.replication_factor,
        };
        topics.validate().context("Invalid topic settings")?;

        let consumer = opts.consumer;
        let retry = RetryPolicy::new(
            consumer.retry_attempts,
            Duration::from_millis(consumer.retry_backoff_ms),
            consumer.concurrency,
        )
        .context("Invalid retry settings")?;

        let terminal_kinds = consumer
            .terminal_error_kinds
            .iter()
            .filter(|kind| !kind.trim().is_empty())
            .map(|kind| kind.parse::<ErrorKind>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid terminal error kinds")?;

        let shutdown_grace = parse_duration(&consumer.shutdown_grace)
            .with_context(|| format!("Invalid shutdown grace: {}", consumer.shutdown_grace))?;
        if consumer.poll_batch_size == 0 {
            anyhow::bail!("poll batch size must be at least 1");
        }

        let runtime = RuntimeSettings {
            topic: topics.topic.clone(),
            group_id: consumer.group_id,
            poll_batch_size: consumer.poll_batch_size,
            max_buffered: consumer.max_buffered.max(1),
            shutdown_grace,
        };

        Ok(Self {
            kafka: opts.kafka,
            topics,
            retry,
            classifier: FailureClassifier::new(terminal_kinds),
            runtime,
            listen_addr: opts.api.listen_addr,
        })
    }
}
