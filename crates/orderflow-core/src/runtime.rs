//! Consumer runtime.
//!
//! One poller task pulls envelopes and hands each to one of a fixed pool
//! of workers. Partition `p` always goes to worker `p mod workers`, so a
//! partition is never processed by two workers at once and its envelopes
//! are handled in offset order, retries included.
//!
//! Per envelope:
//!
//! ```text
//! RECEIVED -> PROCESSING -> SUCCESS -> COMMITTED
//!                        -> FAIL -> classify -> RETRY_WAIT -> PROCESSING
//!                        -> FAIL -> classify -> DEAD_LETTERED -> COMMITTED
//! ```
//!
//! Offsets are committed only once an envelope reaches a terminal state,
//! which gives at-least-once delivery: an envelope abandoned mid-retry is
//! redelivered, with its attempt counter back at zero.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use orderflow_types::Envelope;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::Subscriber;
use crate::classifier::FailureClassifier;
use crate::dead_letter::DeadLetterRouter;
use crate::error::{BrokerError, PipelineError, Result};
use crate::handler::{ErrorKind, MessageHandler, ProcessingError};
use crate::retry::{RetryDecision, RetryPolicy, RetryScheduler};

/// Envelopes queued per worker channel before the poller buffers locally.
const WORKER_QUEUE_DEPTH: usize = 64;
/// How long the poller waits when its local buffer is full.
const IDLE_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Topic to consume from
    pub topic: String,
    /// Consumer group ID
    pub group_id: String,
    /// Maximum number of envelopes requested per poll
    pub poll_batch_size: usize,
    /// Envelopes the poller may hold for busy workers before it stops polling
    pub max_buffered: usize,
    /// How long shutdown waits for workers before abandoning them
    pub shutdown_grace: Duration,
}

impl RuntimeSettings {
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            poll_batch_size: 100,
            max_buffered: 1000,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Counters shared by the poller and workers.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    attempts: AtomicU64,
    committed: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
    rewound: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Handler invocations
    pub attempts: u64,
    /// Offsets committed, after success or dead-lettering
    pub committed: u64,
    /// Attempts scheduled after a backoff
    pub retries: u64,
    pub dead_lettered: u64,
    /// Dead-letter publishes that failed and rewound their partition
    pub rewound: u64,
    /// Envelopes dropped because their partition was rewound
    pub skipped: u64,
}

impl RuntimeStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
            rewound: self.rewound.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

/// Worker index owning `partition`.
pub fn worker_for(partition: i32, workers: usize) -> usize {
    partition.rem_euclid(workers.max(1) as i32) as usize
}

pub struct ConsumerRuntime {
    subscriber: Arc<dyn Subscriber>,
    settings: RuntimeSettings,
    workers: usize,
    pipeline: Arc<Pipeline>,
}

/// Everything a worker needs to drive one envelope to a terminal state.
struct Pipeline {
    subscriber: Arc<dyn Subscriber>,
    handler: Arc<dyn MessageHandler>,
    classifier: FailureClassifier,
    scheduler: RetryScheduler,
    router: DeadLetterRouter,
    stats: Arc<RuntimeStats>,
}

/// How a single envelope left its worker.
enum Outcome {
    Committed,
    DeadLettered,
    Rewound,
    Abandoned,
}

impl ConsumerRuntime {
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
        classifier: FailureClassifier,
        router: DeadLetterRouter,
        settings: RuntimeSettings,
    ) -> Self {
        let pipeline = Pipeline {
            subscriber: Arc::clone(&subscriber),
            handler,
            classifier,
            scheduler: RetryScheduler::new(policy),
            router,
            stats: Arc::new(RuntimeStats::default()),
        };
        Self {
            subscriber,
            settings,
            workers: policy.worker_concurrency.max(1),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Live counters, readable while the runtime is running.
    pub fn stats(&self) -> Arc<RuntimeStats> {
        Arc::clone(&self.pipeline.stats)
    }

    /// Consume until `shutdown` is cancelled or the broker fails.
    ///
    /// On shutdown polling stops at once. Each worker finishes the handler
    /// call (and any backoff) it is in, then abandons its envelope without
    /// committing. Workers still busy after the grace period are aborted.
    pub async fn run(self, shutdown: CancellationToken) -> Result<StatsSnapshot> {
        self.subscriber
            .subscribe(&self.settings.topic, &self.settings.group_id)
            .await?;
        info!(
            "Consuming {} as group {} with {} workers",
            self.settings.topic, self.settings.group_id, self.workers
        );

        // Cancelled on shutdown, or by a worker that hit a broker error.
        let stop = shutdown.child_token();

        let mut senders = Vec::with_capacity(self.workers);
        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
            let pipeline = Arc::clone(&self.pipeline);
            let stop = stop.clone();
            handles.push(tokio::spawn(async move {
                pipeline.worker_loop(index, rx, stop).await
            }));
            senders.push(tx);
        }

        let poll_result = self.poll_loop(&senders, &stop).await;
        if let Err(e) = &poll_result {
            error!("Polling failed, stopping workers: {e}");
        }
        stop.cancel();
        drop(senders);

        let mut first_error = poll_result.err().map(PipelineError::from);
        let deadline = tokio::time::Instant::now() + self.settings.shutdown_grace;
        for (index, mut handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => debug!("Worker {index} stopped"),
                Ok(Ok(Err(e))) => {
                    first_error.get_or_insert(e);
                }
                Ok(Err(join_error)) => {
                    first_error.get_or_insert(PipelineError::Worker {
                        worker: index,
                        message: join_error.to_string(),
                    });
                }
                Err(_) => {
                    warn!("Worker {index} still busy after the shutdown grace period, abandoning it");
                    handle.abort();
                }
            }
        }

        let stats = self.pipeline.stats.snapshot();
        info!(
            "Consumer stopped: {} committed, {} dead-lettered, {} retries, {} attempts",
            stats.committed, stats.dead_lettered, stats.retries, stats.attempts
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn poll_loop(
        &self,
        senders: &[mpsc::Sender<Envelope>],
        stop: &CancellationToken,
    ) -> std::result::Result<(), BrokerError> {
        // Envelopes waiting for a worker whose channel is full. Holding them
        // here keeps the other workers fed while one sits in backoff.
        let mut pending: Vec<VecDeque<Envelope>> = vec![VecDeque::new(); senders.len()];

        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            for (index, queue) in pending.iter_mut().enumerate() {
                while let Some(envelope) = queue.pop_front() {
                    match senders[index].try_send(envelope) {
                        Ok(()) => {}
                        Err(TrySendError::Full(envelope)) => {
                            queue.push_front(envelope);
                            break;
                        }
                        // The worker exited; it has cancelled `stop`.
                        Err(TrySendError::Closed(_)) => return Ok(()),
                    }
                }
            }

            let buffered: usize = pending.iter().map(VecDeque::len).sum();
            if buffered >= self.settings.max_buffered {
                tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(IDLE_TICK) => continue,
                }
            }

            let batch = tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                batch = self.subscriber.poll(self.settings.poll_batch_size) => batch?,
            };
            if !batch.is_empty() {
                debug!("Polled {} envelopes", batch.len());
            }
            for envelope in batch {
                pending[worker_for(envelope.partition, senders.len())].push_back(envelope);
            }
        }
    }
}

impl Pipeline {
    async fn worker_loop(
        &self,
        index: usize,
        mut rx: mpsc::Receiver<Envelope>,
        stop: CancellationToken,
    ) -> Result<()> {
        // Rewound partitions: later offsets still queued are dropped until
        // the rewound offset comes back.
        let mut fences: HashMap<(String, i32), i64> = HashMap::new();

        loop {
            let envelope = tokio::select! {
                biased;
                _ = stop.cancelled() => return Ok(()),
                next = rx.recv() => match next {
                    Some(envelope) => envelope,
                    None => return Ok(()),
                },
            };

            let fence_key = (envelope.source_topic.clone(), envelope.partition);
            if let Some(&fence) = fences.get(&fence_key) {
                if envelope.offset > fence {
                    debug!(
                        "Worker {index} skipping {} until offset {fence} is redelivered",
                        envelope.position()
                    );
                    self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                fences.remove(&fence_key);
            }

            let offset = envelope.offset;
            match self.drive(index, envelope, &stop).await {
                Ok(Outcome::Rewound) => {
                    fences.insert(fence_key, offset);
                }
                Ok(Outcome::Committed | Outcome::DeadLettered | Outcome::Abandoned) => {}
                Err(e) => {
                    error!("Worker {index} stopping: {e}");
                    stop.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Run attempts until the envelope reaches a terminal state.
    async fn drive(
        &self,
        index: usize,
        mut envelope: Envelope,
        stop: &CancellationToken,
    ) -> Result<Outcome> {
        loop {
            debug!(
                "Worker {index} processing {} (key {}, attempt {})",
                envelope.position(),
                envelope.key,
                envelope.attempts_made()
            );
            self.stats.attempts.fetch_add(1, Ordering::SeqCst);

            let error = match self.attempt(&envelope).await {
                Ok(()) => {
                    self.commit(&envelope).await?;
                    return Ok(Outcome::Committed);
                }
                Err(error) => error,
            };

            let verdict = self.classifier.classify(&error);
            match self.scheduler.decide(&envelope, &verdict) {
                RetryDecision::RetryAfter(backoff) => {
                    warn!(
                        "Attempt {} for {} failed ({verdict}), retrying in {}ms",
                        envelope.attempts_made(),
                        envelope.position(),
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                    if stop.is_cancelled() {
                        info!(
                            "Shutting down, abandoning {} for redelivery",
                            envelope.position()
                        );
                        return Ok(Outcome::Abandoned);
                    }
                    self.stats.retries.fetch_add(1, Ordering::SeqCst);
                    envelope = envelope.next_attempt();
                }
                RetryDecision::DeadLetter { reason } => {
                    return match self.router.route(&envelope, &reason, error.kind).await {
                        Ok(_) => {
                            self.stats.dead_lettered.fetch_add(1, Ordering::SeqCst);
                            self.commit(&envelope).await?;
                            Ok(Outcome::DeadLettered)
                        }
                        Err(_) => {
                            self.subscriber
                                .rewind(&envelope.source_topic, envelope.partition, envelope.offset)
                                .await?;
                            self.stats.rewound.fetch_add(1, Ordering::SeqCst);
                            let pause = self.scheduler.policy().backoff_interval;
                            warn!(
                                "Left {} uncommitted for redelivery in {}ms",
                                envelope.position(),
                                pause.as_millis()
                            );
                            // Keeps a dead-letter outage from turning into a hot redelivery loop.
                            tokio::select! {
                                _ = stop.cancelled() => {}
                                _ = tokio::time::sleep(pause) => {}
                            }
                            Ok(Outcome::Rewound)
                        }
                    };
                }
            }
        }
    }

    /// One handler call. A panic is reported as an error of its own kind.
    async fn attempt(&self, envelope: &Envelope) -> std::result::Result<(), ProcessingError> {
        match AssertUnwindSafe(self.handler.process(envelope))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(ProcessingError::new(ErrorKind::Panicked, message))
            }
        }
    }

    async fn commit(&self, envelope: &Envelope) -> Result<()> {
        self.subscriber
            .commit(&envelope.source_topic, envelope.partition, envelope.offset)
            .await?;
        self.stats.committed.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Committed {} after {} attempts",
            envelope.position(),
            envelope.attempts_made()
        );
        Ok(())
    }
}
