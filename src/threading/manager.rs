/// Callback manager - worker pool with main-thread result delivery
///
/// Workers poll a shared pending queue, run their own processor and push a
/// continuation onto the completion queue. The owner pumps [`CallbackManager::update`]
/// once per tick; that is the only place user callbacks run, so callbacks never
/// race with worker threads and need not be thread-safe themselves.
///
/// Lifecycle: NotStarted -> Running (start) -> Stopped (stop). Stopping is
/// cooperative: a worker finishes the job in hand, then exits. Jobs still
/// pending once the pool is stopped resolve as `Cancelled` on the next pump.
///
/// Locks: the pending queue and the completion queue each have their own
/// mutex. Neither is held while a processor or a callback runs.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::envelope::{Callback, EnvelopePool, JobEnvelope, JobHandle, Outcome};
use super::processor::JobProcessor;
use super::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, JobError};

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Pool lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::NotStarted,
            1 => PoolState::Running,
            _ => PoolState::Stopped,
        }
    }
}

/// State shared between the owner and the worker threads
struct Shared<In, Out> {
    state: AtomicU8,
    pending: Mutex<VecDeque<JobEnvelope<In, Out>>>,
    completed: Mutex<VecDeque<Continuation>>,
    pool: Arc<EnvelopePool<In, Out>>,
    stats: Vec<WorkerStats>,
    idle_sleep: Duration,
}

impl<In, Out> Shared<In, Out>
where
    In: Send + 'static,
    Out: Default + Send + 'static,
{
    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Queue `envelope` for completion on the pumping thread
    fn post_result(&self, envelope: JobEnvelope<In, Out>, outcome: Outcome, output: Out) {
        let pool = Arc::clone(&self.pool);
        let continuation: Continuation = Box::new(move || envelope.complete(outcome, output, &pool));
        self.completed.lock().push_back(continuation);
    }
}

/// Snapshot of pool-wide counters for debug displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub thread_count: usize,
    pub pending: usize,
    pub awaiting_delivery: usize,
    pub pooled_envelopes: usize,
    pub processed_last_window: u64,
}

struct WindowClock {
    started: Instant,
    processed_last_window: u64,
}

/// Generic worker pool delivering results back to the owning thread
pub struct CallbackManager<In, Out>
where
    In: Send + 'static,
    Out: Default + Send + 'static,
{
    config: BrokerConfig,
    shared: Arc<Shared<In, Out>>,
    processors: Mutex<Vec<Box<dyn JobProcessor<In, Out>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    window: Mutex<WindowClock>,
}

impl<In, Out> CallbackManager<In, Out>
where
    In: Send + 'static,
    Out: Default + Send + 'static,
{
    /// Build a pool of `config.thread_count` workers. `create_processor` is
    /// called once per worker index; workers are not started yet.
    pub fn new<F>(config: BrokerConfig, mut create_processor: F) -> Result<Self, BrokerError>
    where
        F: FnMut(usize) -> Box<dyn JobProcessor<In, Out>>,
    {
        config.validate()?;

        let thread_count = config.thread_count;
        let processors: Vec<_> = (0..thread_count).map(&mut create_processor).collect();
        let stats = (0..thread_count)
            .map(|_| WorkerStats::new(config.history_length))
            .collect();

        let shared = Arc::new(Shared {
            state: AtomicU8::new(PoolState::NotStarted as u8),
            pending: Mutex::new(VecDeque::new()),
            completed: Mutex::new(VecDeque::new()),
            pool: Arc::new(EnvelopePool::new()),
            stats,
            idle_sleep: config.idle_sleep(),
        });

        Ok(Self {
            config,
            shared,
            processors: Mutex::new(processors),
            handles: Mutex::new(Vec::with_capacity(thread_count)),
            window: Mutex::new(WindowClock {
                started: Instant::now(),
                processed_last_window: 0,
            }),
        })
    }

    /// Spawn the worker threads. Only the first call does anything.
    pub fn start(&self) -> Result<(), BrokerError> {
        let transition = self.shared.state.compare_exchange(
            PoolState::NotStarted as u8,
            PoolState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(current) = transition {
            match PoolState::from_u8(current) {
                PoolState::Running => warn!("Already running threads."),
                _ => warn!("Worker pool was stopped and cannot be restarted."),
            }
            return Ok(());
        }

        let processors = std::mem::take(&mut *self.processors.lock());
        let mut handles = self.handles.lock();

        for (index, processor) in processors.into_iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name_prefix, index))
                .spawn(move || run_worker(index, processor, shared));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    error!(index, %source, "Failed to spawn worker thread; stopping pool");
                    self.shared.state.store(PoolState::Stopped as u8, Ordering::Release);
                    return Err(BrokerError::ThreadSpawn { index, source });
                }
            }
        }

        self.window.lock().started = Instant::now();
        info!(threads = handles.len(), "Worker pool started");
        Ok(())
    }

    /// Ask the workers to exit after their current job. Does not block.
    pub fn stop(&self) {
        let transition = self.shared.state.compare_exchange(
            PoolState::Running as u8,
            PoolState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        match transition {
            Ok(_) => info!("Worker pool stopping"),
            Err(_) => warn!("Not running, cannot stop threads."),
        }
    }

    /// Create an envelope from this pool's free-list
    pub fn create<F>(&self, on_completed: F, input: In) -> JobEnvelope<In, Out>
    where
        F: FnOnce(Outcome, Out) + Send + 'static,
    {
        self.shared.pool.create(on_completed, input)
    }

    /// Create an envelope around a callback that is already boxed
    pub fn create_boxed(&self, on_completed: Callback<Out>, input: In) -> JobEnvelope<In, Out> {
        self.shared.pool.create_boxed(on_completed, input)
    }

    /// Queue an envelope for processing.
    ///
    /// Returns `None` when the envelope is rejected: pooled envelopes are
    /// refused with a warning, and already-cancelled envelopes complete right
    /// away with [`Outcome::Cancelled`] without being queued.
    pub fn post(&self, envelope: JobEnvelope<In, Out>) -> Option<JobHandle> {
        if envelope.is_in_pool() {
            warn!("Attempt to post a job envelope that is currently in the pool; envelopes cannot be re-used");
            return None;
        }
        if envelope.is_cancelled() {
            envelope.complete(Outcome::Cancelled, Out::default(), &self.shared.pool);
            return None;
        }

        let handle = envelope.handle();
        self.shared.pending.lock().push_back(envelope);
        Some(handle)
    }

    /// Main-thread pump: deliver finished jobs and roll the statistics window.
    pub fn update(&self) {
        let ready = std::mem::take(&mut *self.shared.completed.lock());
        for continuation in ready {
            continuation();
        }

        if self.shared.state() == PoolState::Stopped {
            self.cancel_pending();
        }

        let mut window = self.window.lock();
        let elapsed = window.started.elapsed();
        if elapsed >= self.config.stats_window() {
            window.processed_last_window = self
                .shared
                .stats
                .iter()
                .map(|stats| stats.roll_window(elapsed))
                .sum();
            window.started = Instant::now();
        }
    }

    /// Resolve every job still waiting for a worker as cancelled
    fn cancel_pending(&self) {
        let leftover = std::mem::take(&mut *self.shared.pending.lock());
        if leftover.is_empty() {
            return;
        }
        info!(count = leftover.len(), "Cancelling jobs left behind by stopped pool");
        for envelope in leftover {
            envelope.complete(Outcome::Cancelled, Out::default(), &self.shared.pool);
        }
    }

    /// Stop, wait for the workers to exit, then deliver everything outstanding.
    /// Call from the thread that owns callback execution.
    pub fn shutdown(&self) {
        if self.shared.state() == PoolState::Running {
            self.stop();
        } else {
            self.shared.state.store(PoolState::Stopped as u8, Ordering::Release);
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!("Worker thread panicked outside of a job");
            }
        }

        self.update();
    }

    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn thread_count(&self) -> usize {
        self.config.thread_count
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Jobs waiting for a worker
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Finished jobs waiting for the next `update()`
    pub fn awaiting_delivery_count(&self) -> usize {
        self.shared.completed.lock().len()
    }

    /// Envelopes sitting in the free-list
    pub fn pooled_count(&self) -> usize {
        self.shared.pool.pooled_count()
    }

    /// Jobs started by all workers during the last statistics window
    pub fn processed_last_window(&self) -> u64 {
        self.window.lock().processed_last_window
    }

    /// Per-worker statistics, indexed by worker
    pub fn statistics(&self) -> Vec<WorkerStatsSnapshot> {
        self.shared.stats.iter().map(WorkerStats::snapshot).collect()
    }

    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            thread_count: self.thread_count(),
            pending: self.pending_count(),
            awaiting_delivery: self.awaiting_delivery_count(),
            pooled_envelopes: self.pooled_count(),
            processed_last_window: self.processed_last_window(),
        }
    }
}

impl<In, Out> Drop for CallbackManager<In, Out>
where
    In: Send + 'static,
    Out: Default + Send + 'static,
{
    fn drop(&mut self) {
        // Every outstanding job still gets its callback, on the dropping thread
        self.shutdown();
    }
}

/// Worker thread body
fn run_worker<In, Out>(index: usize, mut processor: Box<dyn JobProcessor<In, Out>>, shared: Arc<Shared<In, Out>>)
where
    In: Send + 'static,
    Out: Default + Send + 'static,
{
    let stats = &shared.stats[index];
    debug_log!(worker = index, "Worker thread started");

    while shared.is_running() {
        let next = shared.pending.lock().pop_front();

        let Some(mut envelope) = next else {
            thread::sleep(shared.idle_sleep);
            continue;
        };

        if envelope.is_cancelled() {
            shared.post_result(envelope, Outcome::Cancelled, Out::default());
            continue;
        }

        let Some(input) = envelope.take_input() else {
            warn!(worker = index, "Job envelope arrived without input");
            shared.post_result(envelope, Outcome::Error, Out::default());
            continue;
        };

        stats.record_started();
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(input)));
        stats.record_duration(started.elapsed());

        let (outcome, output) = match result {
            Ok(Ok(output)) => (Outcome::Run, output),
            Ok(Err(err)) => {
                error!(worker = index, %err, "Job processor failed");
                (Outcome::Error, Out::default())
            }
            Err(payload) => {
                let err = JobError::Panicked(panic_message(payload.as_ref()));
                error!(worker = index, %err, "Job processor panicked");
                (Outcome::Error, Out::default())
            }
        };

        shared.post_result(envelope, outcome, output);
    }

    debug_log!(worker = index, "Worker thread exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
