/// Pooled job envelopes
///
/// An envelope carries one job's input, its completion callback and its
/// cancellation flag through the pool. Envelopes are recycled through a
/// lock-free free-list instead of being allocated per request.
///
/// Ownership rules:
/// - A live envelope is owned by exactly one of: the caller, the pending queue,
///   a worker, or the completion queue. Moving the value enforces this.
/// - Callers keep a [`JobHandle`] instead of the envelope. The handle remembers
///   the generation it was issued for; once the envelope goes back to the pool
///   the generation moves on and stale handles become inert.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

/// Delivery-level result of a job, independent of what the job computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The processor ran and produced an output
    Run,
    /// The job was cancelled before a worker picked it up (or the pool stopped first)
    Cancelled,
    /// The processor failed; the output is `Out::default()`
    Error,
}

/// Completion callback. Runs exactly once, on the thread that pumps `update()`.
pub type Callback<Out> = Box<dyn FnOnce(Outcome, Out) + Send + 'static>;

// EnvelopeCore::state layout: [generation:62][in_pool:1][cancelled:1]
const CANCELLED: u64 = 0b01;
const IN_POOL: u64 = 0b10;
const GENERATION_SHIFT: u32 = 2;

#[inline]
fn generation_of(state: u64) -> u64 {
    state >> GENERATION_SHIFT
}

/// Shared state between an envelope and the handles issued for it
#[derive(Debug)]
struct EnvelopeCore {
    state: AtomicU64,
}

impl EnvelopeCore {
    fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    /// Set the cancelled bit if `generation` is still the live one
    fn cancel(&self, generation: u64) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if generation_of(current) != generation || current & IN_POOL != 0 {
                return false;
            }
            if current & CANCELLED != 0 {
                return true;
            }
            match self.state.compare_exchange_weak(
                current,
                current | CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn is_cancelled(&self, generation: u64) -> bool {
        let state = self.state.load(Ordering::Acquire);
        generation_of(state) == generation && state & CANCELLED != 0
    }

    fn is_live(&self, generation: u64) -> bool {
        let state = self.state.load(Ordering::Acquire);
        generation_of(state) == generation && state & IN_POOL == 0
    }

    fn is_in_pool(&self) -> bool {
        self.state.load(Ordering::Acquire) & IN_POOL != 0
    }

    fn generation(&self) -> u64 {
        generation_of(self.state.load(Ordering::Acquire))
    }

    /// Retire the current generation and flag the envelope as pooled
    fn retire(&self) {
        let next = self.generation().wrapping_add(1);
        self.state.store((next << GENERATION_SHIFT) | IN_POOL, Ordering::Release);
    }

    /// Bring a pooled envelope back to life (not cancelled)
    fn revive(&self) -> u64 {
        let generation = self.generation();
        self.state.store(generation << GENERATION_SHIFT, Ordering::Release);
        generation
    }
}

/// Storage recycled by the pool
struct EnvelopeSlot<In, Out> {
    core: Arc<EnvelopeCore>,
    generation: u64,
    input: Option<In>,
    on_completed: Option<Callback<Out>>,
}

/// A job on its way through the pool
pub struct JobEnvelope<In, Out> {
    slot: Box<EnvelopeSlot<In, Out>>,
}

impl<In, Out> JobEnvelope<In, Out> {
    /// Handle that can cancel this job from any thread
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            core: Arc::clone(&self.slot.core),
            generation: self.slot.generation,
        }
    }

    /// Flag the job as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.slot.core.cancel(self.slot.generation);
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.core.is_cancelled(self.slot.generation)
    }

    pub fn is_in_pool(&self) -> bool {
        self.slot.core.is_in_pool()
    }

    pub fn input(&self) -> Option<&In> {
        self.slot.input.as_ref()
    }

    pub(crate) fn take_input(&mut self) -> Option<In> {
        self.slot.input.take()
    }

    /// Fire the callback, then return the envelope to `pool`.
    /// Must run on the thread that owns callback execution.
    pub(crate) fn complete(mut self, outcome: Outcome, output: Out, pool: &EnvelopePool<In, Out>) {
        match self.slot.on_completed.take() {
            Some(callback) => callback(outcome, output),
            None => tracing::warn!("Completing a job envelope whose callback already fired"),
        }
        self.return_to_pool(pool);
    }

    fn return_to_pool(mut self, pool: &EnvelopePool<In, Out>) {
        // Drop anything the job captured so pooled envelopes don't keep it alive
        self.slot.input = None;
        self.slot.on_completed = None;
        self.slot.core.retire();
        pool.free.push(self.slot);
    }

    #[cfg(test)]
    pub(crate) fn force_in_pool(&self) {
        self.slot.core.retire();
    }
}

impl<In, Out> fmt::Debug for JobEnvelope<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEnvelope")
            .field("generation", &self.slot.generation)
            .field("cancelled", &self.is_cancelled())
            .field("in_pool", &self.is_in_pool())
            .field("has_callback", &self.slot.on_completed.is_some())
            .finish()
    }
}

/// Caller-side reference to a posted job.
///
/// Cloneable and cheap. Becomes inert once the job's callback has fired,
/// even if the underlying envelope is reused for another job.
#[derive(Clone)]
pub struct JobHandle {
    core: Arc<EnvelopeCore>,
    generation: u64,
}

impl JobHandle {
    /// Request cancellation. Returns false if the job already completed.
    ///
    /// Best effort: a job a worker has already started still runs to completion
    /// and reports [`Outcome::Run`].
    pub fn cancel(&self) -> bool {
        self.core.cancel(self.generation)
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled(self.generation)
    }

    /// True until the completion callback has fired
    pub fn is_pending(&self) -> bool {
        self.core.is_live(self.generation)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("generation", &self.generation)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Free-list of recycled envelopes.
///
/// `create` runs on the caller's thread and `complete` on the pumping thread,
/// so the list itself is a lock-free queue.
pub struct EnvelopePool<In, Out> {
    free: SegQueue<Box<EnvelopeSlot<In, Out>>>,
    allocated: AtomicUsize,
}

impl<In, Out> EnvelopePool<In, Out> {
    pub fn new() -> Self {
        Self {
            free: SegQueue::new(),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Wrap `input` and `on_completed` in a live envelope, reusing a pooled one if possible
    pub fn create<F>(&self, on_completed: F, input: In) -> JobEnvelope<In, Out>
    where
        F: FnOnce(Outcome, Out) + Send + 'static,
    {
        self.create_boxed(Box::new(on_completed), input)
    }

    /// Same as [`create`](Self::create) for a callback that is already boxed
    pub fn create_boxed(&self, on_completed: Callback<Out>, input: In) -> JobEnvelope<In, Out> {
        let slot = match self.free.pop() {
            Some(mut slot) => {
                slot.generation = slot.core.revive();
                slot.input = Some(input);
                slot.on_completed = Some(on_completed);
                slot
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                let core = Arc::new(EnvelopeCore::new());
                let generation = core.generation();
                Box::new(EnvelopeSlot {
                    core,
                    generation,
                    input: Some(input),
                    on_completed: Some(on_completed),
                })
            }
        };

        JobEnvelope { slot }
    }

    /// Envelopes currently waiting in the free-list
    pub fn pooled_count(&self) -> usize {
        self.free.len()
    }

    /// Envelopes ever allocated by this pool
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl<In, Out> Default for EnvelopePool<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}
