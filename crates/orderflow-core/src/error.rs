use thiserror::Error;

/// Failure of a single publish, on the main path or the dead-letter path.
///
/// Never retried by the component that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Record key must not be empty")]
    InvalidKey,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out waiting for delivery: {0}")]
    Timeout(String),

    #[error("Broker error: {0}")]
    Broker(String),
}

/// Broker connectivity and consumer-group failures.
///
/// Fatal to the current poll cycle; the process supervisor decides what
/// happens next.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Consumer is not subscribed to any topic")]
    NotSubscribed,

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Failed to poll: {0}")]
    Poll(String),

    #[error("Failed to commit offset: {0}")]
    Commit(String),

    #[error("Failed to rewind partition: {0}")]
    Rewind(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown error kind: {0}")]
    UnknownErrorKind(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
