pub mod backend;
pub mod config;
pub mod engine;
pub mod format;
pub mod host;
pub mod metrics;
pub mod output;
pub mod sanitize;
pub mod testing;

pub use backend::{Backend, BackendDescriptor, MethodKind};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, EngineConfig,
    ServerConfig, ToolsConfig,
};
pub use engine::{
    ConversionError, ConversionOutcome, ConversionRequest, Dispatcher, FailureClass, Quality,
    StrategyTable,
};
pub use format::{FormatFamily, SourceFormat, SourceProfile, TargetFormat};
pub use host::{ConcurrencyHost, PoolStatus, Tool, ToolLocator, ToolStatus};
pub use output::OutputRoot;
pub use sanitize::clean_filename;
