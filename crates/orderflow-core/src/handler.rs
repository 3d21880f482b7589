//! Handler contract.
//!
//! A handler processes one envelope and returns an explicit result. It is
//! expected to do only its own work: the runtime owns retries, backoff,
//! dead-lettering and commits.

use async_trait::async_trait;
use orderflow_types::Envelope;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ConfigError;

/// What went wrong in a failed attempt.
///
/// The classifier maps kinds to Retryable or Terminal; handlers only
/// describe the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Record content is invalid for the domain
    InputMalformed,
    /// A field had an unexpected type
    TypeMismatch,
    /// The payload could not be decoded
    Deserialization,
    /// Explicitly flagged as not worth retrying
    Permanent,
    /// A downstream call timed out
    Timeout,
    /// A downstream dependency was temporarily unavailable
    Unavailable,
    /// The handler panicked
    Panicked,
    Other,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::InputMalformed,
        ErrorKind::TypeMismatch,
        ErrorKind::Deserialization,
        ErrorKind::Permanent,
        ErrorKind::Timeout,
        ErrorKind::Unavailable,
        ErrorKind::Panicked,
        ErrorKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputMalformed => "input_malformed",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Panicked => "panicked",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownErrorKind(s.to_string()))
    }
}

/// Error returned by a handler for one attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A transient failure, e.g. a downstream timeout.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// A failure flagged as permanent by the domain.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputMalformed, message)
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Deserialization, message)
    }
}

/// User-supplied processing step.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError>;
}
