//! Failure classification.

use std::collections::BTreeSet;

use orderflow_types::Verdict;

use crate::handler::{ErrorKind, ProcessingError};

/// Kinds that go straight to the dead-letter topic unless configured
/// otherwise.
pub const DEFAULT_TERMINAL_KINDS: [ErrorKind; 4] = [
    ErrorKind::InputMalformed,
    ErrorKind::TypeMismatch,
    ErrorKind::Deserialization,
    ErrorKind::Permanent,
];

/// Maps a processing error to Retryable or Terminal.
///
/// Kinds outside the terminal set are retried: an unknown failure is
/// treated as transient rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    terminal_kinds: BTreeSet<ErrorKind>,
}

impl FailureClassifier {
    pub fn new(terminal_kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            terminal_kinds: terminal_kinds.into_iter().collect(),
        }
    }

    pub fn classify(&self, error: &ProcessingError) -> Verdict {
        if self.is_terminal(error.kind) {
            Verdict::Terminal(error.to_string())
        } else {
            Verdict::Retryable(error.to_string())
        }
    }

    pub fn is_terminal(&self, kind: ErrorKind) -> bool {
        self.terminal_kinds.contains(&kind)
    }

    pub fn terminal_kinds(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.terminal_kinds.iter().copied()
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_KINDS)
    }
}
