//! Fixed-interval retry policy and the scheduler that applies it.

use std::time::Duration;

use orderflow_types::{Envelope, Verdict};

use crate::error::ConfigError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_WORKER_CONCURRENCY: usize = 3;

/// Process-wide retry settings, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_attempts: u32,
    /// Wait between two attempts of the same envelope
    pub backoff_interval: Duration,
    /// Number of workers in the consumer pool
    pub worker_concurrency: usize,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff_interval: Duration,
        worker_concurrency: usize,
    ) -> Result<Self, ConfigError> {
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff_interval,
            worker_concurrency,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_interval: DEFAULT_BACKOFF_INTERVAL,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
        }
    }
}

/// What to do with an envelope after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then run the next attempt on the same worker.
    RetryAfter(Duration),
    /// Hand the envelope to the dead-letter router now.
    DeadLetter { reason: String },
}

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide between another attempt and the dead-letter topic.
    ///
    /// Terminal verdicts bypass backoff regardless of the attempt count.
    pub fn decide(&self, envelope: &Envelope, verdict: &Verdict) -> RetryDecision {
        match verdict {
            Verdict::Terminal(cause) => RetryDecision::DeadLetter {
                reason: cause.clone(),
            },
            Verdict::Retryable(cause) if envelope.attempt >= self.policy.max_attempts => {
                RetryDecision::DeadLetter {
                    reason: format!(
                        "retries exhausted after {} attempts: {cause}",
                        envelope.attempts_made()
                    ),
                }
            }
            Verdict::Retryable(_) => RetryDecision::RetryAfter(self.policy.backoff_interval),
        }
    }
}
