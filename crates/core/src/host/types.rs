use serde::Serialize;
use std::path::PathBuf;

use super::discovery::Tool;

/// Worker pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Jobs currently running.
    pub active_jobs: usize,
    /// Pool size.
    pub max_workers: usize,
    /// Jobs waiting for a worker.
    pub queued_jobs: usize,
    /// Jobs that finished normally.
    pub total_completed: u64,
    /// Jobs that panicked or were cancelled.
    pub total_failed: u64,
}

/// Availability of one external tool on this host.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub tool: Tool,
    pub label: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
