//! Error types for the concurrency host.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the blocking worker pool.
#[derive(Debug, Error)]
pub enum HostError {
    /// The worker pool was closed.
    #[error("Worker pool is closed")]
    PoolClosed,

    /// The blocking task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    WorkerFailed(String),
}

/// Errors from subprocess supervision.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be found.
    #[error("Executable not found: {program}")]
    NotFound { program: PathBuf },

    /// The process could not be spawned.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its wall-clock allotment and was killed.
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: PathBuf, timeout_secs: u64 },

    /// I/O while waiting for the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
