use std::path::PathBuf;

use omniconv_core::{Config, Dispatcher, OutputRoot};

/// Shared application state
pub struct AppState {
    config: Config,
    dispatcher: Dispatcher,
    uploads: OutputRoot,
    outputs: OutputRoot,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let dispatcher = Dispatcher::new(&config);
        Self::with_dispatcher(config, dispatcher)
    }

    /// State with a prepared dispatcher (custom strategy table or host).
    pub fn with_dispatcher(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            uploads: OutputRoot::new(&config.engine.upload_dir),
            outputs: OutputRoot::new(&config.engine.output_dir),
            config,
            dispatcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Path of an uploaded file, creating the upload directory on first use.
    pub fn upload_path(&self, name: &str) -> std::io::Result<PathBuf> {
        self.uploads.file(name)
    }

    pub fn output_dir(&self) -> std::io::Result<PathBuf> {
        self.outputs.get().map(PathBuf::from)
    }

    /// Path of a converted file, creating the output directory on first use.
    pub fn output_path(&self, name: &str) -> std::io::Result<PathBuf> {
        self.outputs.file(name)
    }
}
