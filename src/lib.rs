//! orderflow
//!
//! A resilient order pipeline on Kafka: an HTTP API publishes orders keyed
//! by their id, and a consumer runtime processes them with bounded
//! concurrency, fixed-backoff retries and a dead-letter topic.
//!
//! # Crates
//!
//! - `orderflow_types` - envelope, verdict, dead-letter record, order codec
//! - `orderflow_core` - producer gateway, classifier, retry scheduler,
//!   dead-letter router, consumer runtime
//! - `orderflow_kafka` - rdkafka broker client and topic provisioning
//! - `orderflow_api` - `POST /orders`
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the orders and dead-letter topics
//! orderflow provision --kafka-brokers localhost:9092 --partitions 5
//!
//! # Accept orders over HTTP
//! orderflow api --listen-addr 0.0.0.0:8080
//!
//! # Process orders
//! RETRY_ATTEMPTS=5 RETRY_BACKOFF_MS=3000 orderflow consume
//!
//! # Both in one process
//! orderflow serve
//! ```

use std::sync::Arc;

use orderflow_core::{
    BrokerClient, ConsumerRuntime, DeadLetterRouter, MessageHandler, ProducerGateway,
};

pub mod config;
pub mod handler;

pub use config::{AppConfig, PipelineOpts};
pub use handler::OrderHandler;

/// Producer gateway for the orders topic.
pub fn order_gateway<B: BrokerClient + 'static>(config: &AppConfig, broker: Arc<B>) -> ProducerGateway {
    ProducerGateway::new(broker, config.topics.topic.clone())
}

/// Consumer runtime wired to `broker` with the configured policy.
pub fn consumer_runtime<B: BrokerClient + 'static>(
    config: &AppConfig,
    broker: Arc<B>,
    handler: Arc<dyn MessageHandler>,
) -> ConsumerRuntime {
    let dlq_gateway = ProducerGateway::new(broker.clone(), config.topics.dlq_topic.clone());
    let router = DeadLetterRouter::new(dlq_gateway, config.topics.dlq_topic.clone());
    ConsumerRuntime::new(
        broker,
        handler,
        config.retry,
        config.classifier.clone(),
        router,
        config.runtime.clone(),
    )
}
