//! Test doubles for the consumer runtime.
//!
//! Faults are scripted per key and consumed in order, so a test states
//! exactly which attempts fail and how. Nothing here is random and none of
//! it is wired into the production handler.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use orderflow_types::Envelope;
use tokio::time::Instant;

use crate::handler::{MessageHandler, ProcessingError};

/// A failure to inject into one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Fail(ProcessingError),
    Panic(String),
}

/// Decides, per attempt, whether the wrapped handler should fail instead.
pub trait FaultInjector: Send + Sync {
    fn inject(&self, envelope: &Envelope) -> Option<Fault>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key queues of faults.
///
/// Each attempt for a key pops the next fault; once the queue is empty the
/// key's permanent fault (if any) applies, otherwise the attempt runs.
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    queued: Mutex<HashMap<String, VecDeque<Fault>>>,
    permanent: Mutex<HashMap<String, Fault>>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` attempts for `key` with `error`.
    pub fn fail_times(self, key: &str, times: usize, error: ProcessingError) -> Self {
        lock(&self.queued)
            .entry(key.to_string())
            .or_default()
            .extend(std::iter::repeat(Fault::Fail(error)).take(times));
        self
    }

    /// Fail every attempt for `key` once the queued faults are used up.
    pub fn fail_always(self, key: &str, error: ProcessingError) -> Self {
        lock(&self.permanent).insert(key.to_string(), Fault::Fail(error));
        self
    }

    /// Panic on the next attempt for `key`.
    pub fn panic_once(self, key: &str, message: &str) -> Self {
        lock(&self.queued)
            .entry(key.to_string())
            .or_default()
            .push_back(Fault::Panic(message.to_string()));
        self
    }
}

impl FaultInjector for ScriptedFaults {
    fn inject(&self, envelope: &Envelope) -> Option<Fault> {
        if let Some(fault) = lock(&self.queued)
            .get_mut(&envelope.key)
            .and_then(VecDeque::pop_front)
        {
            return Some(fault);
        }
        lock(&self.permanent).get(&envelope.key).cloned()
    }
}

/// Runs the injector before delegating to the wrapped handler.
pub struct FaultInjectingHandler<H> {
    inner: H,
    injector: Box<dyn FaultInjector>,
}

impl<H: MessageHandler> FaultInjectingHandler<H> {
    pub fn new(inner: H, injector: impl FaultInjector + 'static) -> Self {
        Self {
            inner,
            injector: Box::new(injector),
        }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for FaultInjectingHandler<H> {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        match self.injector.inject(envelope) {
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Panic(message)) => panic!("{message}"),
            None => self.inner.process(envelope).await,
        }
    }
}

/// Handler that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl MessageHandler for AcceptAll {
    async fn process(&self, _envelope: &Envelope) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// One handler invocation as seen by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub key: String,
    pub partition: i32,
    pub offset: i64,
    pub attempt: u32,
    pub started_at: Instant,
}

#[derive(Default)]
struct Recording {
    attempts: Vec<Attempt>,
    in_flight: HashSet<String>,
    running: usize,
    max_running: usize,
    overlaps: usize,
}

/// Records every attempt and flags a key processed by two tasks at once.
pub struct RecordingHandler<H> {
    inner: H,
    work_time: Duration,
    recording: Mutex<Recording>,
}

impl<H: MessageHandler> RecordingHandler<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            work_time: Duration::ZERO,
            recording: Mutex::new(Recording::default()),
        }
    }

    /// Hold each attempt open for `work_time` before running the inner
    /// handler, widening the window in which overlaps would show.
    pub fn with_work_time(mut self, work_time: Duration) -> Self {
        self.work_time = work_time;
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        lock(&self.recording).attempts.clone()
    }

    pub fn attempts_for(&self, key: &str) -> Vec<Attempt> {
        lock(&self.recording)
            .attempts
            .iter()
            .filter(|attempt| attempt.key == key)
            .cloned()
            .collect()
    }

    /// Times an attempt started while another attempt for the same key was
    /// still running.
    pub fn overlaps(&self) -> usize {
        lock(&self.recording).overlaps
    }

    /// Highest number of attempts running at the same time, over all keys.
    pub fn max_concurrency(&self) -> usize {
        lock(&self.recording).max_running
    }

    fn enter(&self, envelope: &Envelope) {
        let mut recording = lock(&self.recording);
        recording.attempts.push(Attempt {
            key: envelope.key.clone(),
            partition: envelope.partition,
            offset: envelope.offset,
            attempt: envelope.attempt,
            started_at: Instant::now(),
        });
        if !recording.in_flight.insert(envelope.key.clone()) {
            recording.overlaps += 1;
        }
        recording.running += 1;
        recording.max_running = recording.max_running.max(recording.running);
    }
}

/// Leaves the in-flight set on drop, so panicking attempts are accounted
/// for too.
struct InFlight<'a> {
    recording: &'a Mutex<Recording>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut recording = lock(self.recording);
        recording.in_flight.remove(&self.key);
        recording.running = recording.running.saturating_sub(1);
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for RecordingHandler<H> {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        self.enter(envelope);
        let _in_flight = InFlight {
            recording: &self.recording,
            key: envelope.key.clone(),
        };
        if !self.work_time.is_zero() {
            tokio::time::sleep(self.work_time).await;
        }
        self.inner.process(envelope).await
    }
}
