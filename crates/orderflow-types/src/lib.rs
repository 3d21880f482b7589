//! Shared types for the orderflow pipeline.
//!
//! # Modules
//!
//! - [`envelope`] - the unit of work moving through the consumer runtime
//! - [`verdict`] - Retryable / Terminal classification of a failed attempt
//! - [`dead_letter`] - the record written to the dead-letter topic
//! - [`order`] - the order domain event and its protobuf wire codec
//! - [`error`] - error types for encoding and decoding
//!
//! These types carry no broker or runtime dependencies so that the API,
//! the core pipeline and the Kafka adapter can all share them.

pub mod dead_letter;
pub mod envelope;
pub mod error;
pub mod order;
pub mod verdict;

pub use dead_letter::{DeadLetterRecord, DLQ_HEADER_NAMES};
pub use envelope::Envelope;
pub use error::{Result, TypesError};
pub use order::OrderEvent;
pub use verdict::Verdict;
