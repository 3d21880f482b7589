//! Failure verdict.

use std::fmt;

/// Classification of one failed processing attempt.
///
/// Produced once per attempt and consumed by the retry scheduler; never
/// stored. The cause is the rendered error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Worth retrying after the backoff interval.
    Retryable(String),
    /// Goes straight to the dead-letter topic.
    Terminal(String),
}

impl Verdict {
    pub fn cause(&self) -> &str {
        match self {
            Verdict::Retryable(cause) | Verdict::Terminal(cause) => cause,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Verdict::Terminal(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Retryable(cause) => write!(f, "retryable: {cause}"),
            Verdict::Terminal(cause) => write!(f, "terminal: {cause}"),
        }
    }
}
