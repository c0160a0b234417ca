use thiserror::Error;

/// Errors raised while building or configuring a worker pool.
///
/// Job-level failures never surface here; they travel through the job's
/// completion callback as an [`Outcome`](crate::threading::Outcome).
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid thread count '{0}': must be at least 1")]
    InvalidThreadCount(usize),
    #[error("Failed to spawn worker thread {index}: {source}")]
    ThreadSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Failure reported by a job processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Processor fault: {0}")]
    Fault(String),
    #[error("Processor panicked: {0}")]
    Panicked(String),
}
