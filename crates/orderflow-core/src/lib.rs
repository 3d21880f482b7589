//! Consume, classify, retry and dead-letter pipeline.
//!
//! The core never talks to Kafka directly. It drives any [`BrokerClient`]:
//!
//! - Producer Gateway: keyed publishes to the main topic
//! - Consumer Runtime: bounded worker pool with per-partition ordering
//! - Failure Classifier and Retry Scheduler: fixed-backoff retries for
//!   transient failures, immediate dead-lettering for terminal ones
//! - Dead-Letter Router: republishes failed envelopes with their context

/// Publisher and Subscriber traits implemented by broker backends
pub mod broker;
pub mod classifier;
pub mod dead_letter;
pub mod error;
pub mod handler;

/// In-process broker for tests and local runs
pub mod memory;
pub mod partition;
pub mod producer;
pub mod retry;

/// Poller plus worker pool driving envelopes to a committed state
pub mod runtime;

/// Scripted fault injection and recording handlers for tests
pub mod testing;

// Re-export main types for easy access
pub use broker::{BrokerClient, Delivery, OutboundRecord, Publisher, Subscriber};
pub use classifier::{FailureClassifier, DEFAULT_TERMINAL_KINDS};
pub use dead_letter::DeadLetterRouter;
pub use error::{BrokerError, ConfigError, PipelineError, PublishError, Result};
pub use handler::{ErrorKind, MessageHandler, ProcessingError};
pub use memory::MemoryBroker;
pub use producer::ProducerGateway;
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use runtime::{ConsumerRuntime, RuntimeSettings, RuntimeStats, StatsSnapshot};
