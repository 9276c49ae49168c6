//! Conversion engine: routing, fallback execution and per-request workspaces.

mod dispatcher;
mod error;
mod executor;
mod strategy;
mod types;
mod workspace;

pub use dispatcher::Dispatcher;
pub use error::{truncate_diagnostic, ConversionError, FailureClass};
pub use executor::{ExecutionContext, FallbackExecutor};
pub use strategy::StrategyTable;
pub use types::{
    AttemptOutcome, AttemptResult, BackendOutput, ConversionOutcome, ConversionRequest, Quality,
};
pub use workspace::{ResourceScope, Workspace};
