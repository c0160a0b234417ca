/// Per-worker performance statistics
///
/// Each worker is the only writer of its own [`WorkerStats`]; the pumping thread
/// reads copy-on-read snapshots and rolls the reporting window.
///
/// - Recent durations: ring buffer of the last `history_length` jobs (newest first)
/// - Window counters: busy time and jobs started since the last roll, kept in
///   atomics so the roll can swap them to zero without tearing
/// - Published window: usage fraction and job count of the last full window

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// Totals of the last completed reporting window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowTotals {
    /// Fraction of the window spent processing, 0.0 (idle) to 1.0 (always busy)
    pub average_usage: f32,
    /// Jobs this worker started during the window
    pub processed_last_window: u64,
}

pub struct WorkerStats {
    history: Mutex<VecDeque<Duration>>,
    history_length: usize,
    busy_nanos: AtomicU64,
    processed: AtomicU64,
    window: ArcSwap<WindowTotals>,
}

impl WorkerStats {
    pub fn new(history_length: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(history_length)),
            history_length: history_length.max(1),
            busy_nanos: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            window: ArcSwap::from_pointee(WindowTotals::default()),
        }
    }

    /// Worker side: a job is about to run
    #[inline]
    pub fn record_started(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker side: a job took `elapsed`
    pub fn record_duration(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.busy_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut history = self.history.lock();
        if history.len() == self.history_length {
            history.pop_back();
        }
        history.push_front(elapsed);
    }

    /// Pump side: close the current window of length `elapsed` and publish its totals.
    /// Returns the number of jobs started during the window.
    pub fn roll_window(&self, elapsed: Duration) -> u64 {
        let busy = self.busy_nanos.swap(0, Ordering::Relaxed);
        let processed = self.processed.swap(0, Ordering::Relaxed);

        let window_nanos = elapsed.as_nanos().max(1) as f64;
        let average_usage = ((busy as f64) / window_nanos).min(1.0) as f32;

        self.window.store(Arc::new(WindowTotals {
            average_usage,
            processed_last_window: processed,
        }));

        processed
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let window = **self.window.load();
        let recent: Vec<Duration> = self.history.lock().iter().copied().collect();

        WorkerStatsSnapshot {
            average_usage: window.average_usage,
            processed_last_window: window.processed_last_window,
            recent,
        }
    }
}

/// Copy of a worker's statistics at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStatsSnapshot {
    pub average_usage: f32,
    pub processed_last_window: u64,
    /// Recent process durations, newest first
    pub recent: Vec<Duration>,
}

impl WorkerStatsSnapshot {
    /// Shortest recent duration (zero with no history)
    pub fn min_process_time(&self) -> Duration {
        self.recent.iter().copied().min().unwrap_or_default()
    }

    /// Longest recent duration (zero with no history)
    pub fn max_process_time(&self) -> Duration {
        self.recent.iter().copied().max().unwrap_or_default()
    }

    /// Mean of the recorded durations only (zero with no history)
    pub fn mean_process_time(&self) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.recent.iter().sum();
        total / self.recent.len() as u32
    }
}
