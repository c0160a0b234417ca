// Worker pool with main-thread callback delivery
// Generic over the job input/output; the pathfinder is one client of it.

pub mod envelope;
pub mod manager;
pub mod processor;
pub mod stats;

pub use envelope::{Callback, EnvelopePool, JobEnvelope, JobHandle, Outcome};
pub use manager::{CallbackManager, PoolState, PoolSummary};
pub use processor::JobProcessor;
pub use stats::{WindowTotals, WorkerStats, WorkerStatsSnapshot};
