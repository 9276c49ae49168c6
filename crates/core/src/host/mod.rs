//! Concurrency host: bounded blocking work, supervised subprocesses and tool discovery.

mod discovery;
mod error;
mod pool;
mod process;
mod types;

pub use discovery::{Tool, ToolLocator};
pub use error::{HostError, ProcessError};
pub use pool::WorkerPool;
pub use process::{run_process, ProcessOutput, ProcessSpec};
pub use types::{PoolStatus, ToolStatus};

use std::time::Duration;

use crate::config::Config;

/// Which timeout applies to a subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTier {
    /// Document, image, archive and rasterization tools.
    Document,
    /// Audio/video transcoding.
    Media,
}

/// Shared execution resources for every backend.
#[derive(Clone)]
pub struct ConcurrencyHost {
    pool: WorkerPool,
    locator: ToolLocator,
    document_timeout: Duration,
    media_timeout: Duration,
}

impl ConcurrencyHost {
    pub fn new(config: &Config) -> Self {
        Self {
            pool: WorkerPool::new(config.engine.worker_count()),
            locator: ToolLocator::from_config(&config.tools),
            document_timeout: Duration::from_secs(config.engine.document_timeout_secs),
            media_timeout: Duration::from_secs(config.engine.media_timeout_secs),
        }
    }

    pub fn with_parts(
        pool: WorkerPool,
        locator: ToolLocator,
        document_timeout: Duration,
        media_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            locator,
            document_timeout,
            media_timeout,
        }
    }

    /// Runs a blocking closure on the bounded worker pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, HostError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.pool.run(f).await
    }

    /// Runs a supervised subprocess.
    pub async fn run_process(&self, spec: ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        run_process(spec).await
    }

    pub fn timeout(&self, tier: TimeoutTier) -> Duration {
        match tier {
            TimeoutTier::Document => self.document_timeout,
            TimeoutTier::Media => self.media_timeout,
        }
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}
