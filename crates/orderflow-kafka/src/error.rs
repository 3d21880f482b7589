use orderflow_core::PublishError;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Topic creation error: {0}")]
    TopicCreation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map a produce failure onto the pipeline's publish error.
pub(crate) fn publish_error(err: KafkaError) -> PublishError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => PublishError::Timeout(err.to_string()),
        _ => PublishError::Broker(err.to_string()),
    }
}
