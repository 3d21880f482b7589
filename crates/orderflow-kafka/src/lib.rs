//! Kafka backend for the orderflow pipeline.
//!
//! - `KafkaBroker`: `FutureProducer` for publishing, `StreamConsumer` with
//!   manual offset commits for consuming
//! - `provision_topics`: creates the main and dead-letter topics at startup

pub mod admin;
pub mod client;

/// Connection settings, parsed from CLI flags and environment variables
pub mod config;
pub mod error;

// Re-export main types for easy access
pub use admin::{provision_topics, TopicLayout};
pub use client::KafkaBroker;
pub use config::KafkaConfig;
pub use error::{Error, Result};
