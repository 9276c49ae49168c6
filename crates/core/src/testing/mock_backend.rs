//! Scripted backend for testing the executor and dispatcher.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::backend::{AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::SourceFormat;
use crate::host::{ConcurrencyHost, TimeoutTier};

/// What the mock does when invoked.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Writes `content` to the expected output path.
    Write(String),
    /// Writes `pages` numbered outputs (`<stem>_<label>_<n>.png`).
    WritePages(usize),
    /// Fails with a recoverable execution error.
    Fail(String),
    /// Fails with a fatal corrupt-input error.
    Corrupt(String),
    /// The precondition probe reports the tool as missing.
    Unavailable,
    /// Panics inside the attempt.
    Panic(String),
    /// Runs a subprocess, then writes `done`.
    Run { program: PathBuf, args: Vec<String> },
}

/// Mock implementation of the Backend trait.
///
/// Provides controllable behavior for testing:
/// - Scripted success, failure, panic or missing tool
/// - Call counting for fallback assertions
/// - Records every attempt directory it was given
///
/// # Example
///
/// ```rust,ignore
/// use omniconv_core::testing::MockBackend;
///
/// let office = Arc::new(MockBackend::unavailable("libreoffice", "LibreOffice"));
/// let native = Arc::new(MockBackend::writing("native", "Native", "%PDF-1.5"));
///
/// // Run through a strategy table...
/// assert_eq!(office.calls(), 0);
/// assert_eq!(native.calls(), 1);
/// ```
#[derive(Debug)]
pub struct MockBackend {
    descriptor: BackendDescriptor,
    behavior: MockBehavior,
    calls: AtomicUsize,
    attempt_dirs: Mutex<Vec<PathBuf>>,
}

impl MockBackend {
    pub fn new(id: &'static str, label: &'static str, behavior: MockBehavior) -> Self {
        Self {
            descriptor: BackendDescriptor::library(id, label),
            behavior,
            calls: AtomicUsize::new(0),
            attempt_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn writing(id: &'static str, label: &'static str, content: impl Into<String>) -> Self {
        Self::new(id, label, MockBehavior::Write(content.into()))
    }

    pub fn pages(id: &'static str, label: &'static str, pages: usize) -> Self {
        Self::new(id, label, MockBehavior::WritePages(pages))
    }

    pub fn failing(id: &'static str, label: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, label, MockBehavior::Fail(message.into()))
    }

    pub fn corrupt(id: &'static str, label: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, label, MockBehavior::Corrupt(message.into()))
    }

    pub fn unavailable(id: &'static str, label: &'static str) -> Self {
        Self::new(id, label, MockBehavior::Unavailable)
    }

    pub fn panicking(id: &'static str, label: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, label, MockBehavior::Panic(message.into()))
    }

    pub fn running(
        id: &'static str,
        label: &'static str,
        program: impl Into<PathBuf>,
        args: &[&str],
    ) -> Self {
        Self::new(
            id,
            label,
            MockBehavior::Run {
                program: program.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    /// Number of attempts (not probes) made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Attempt directories handed to this backend, in call order.
    pub fn attempt_dirs(&self) -> Vec<PathBuf> {
        self.attempt_dirs
            .lock()
            .map(|dirs| dirs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, _source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        match self.behavior {
            MockBehavior::Unavailable => Err(ConversionError::tool_unavailable(self.descriptor.label)),
            _ => Ok(()),
        }
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dirs) = self.attempt_dirs.lock() {
            dirs.push(ctx.attempt_dir.clone());
        }

        match &self.behavior {
            MockBehavior::Write(content) => {
                let output = ctx.output_path();
                tokio::fs::write(&output, content).await?;
                Ok(BackendOutput::single(output))
            }
            MockBehavior::WritePages(pages) => {
                let mut files = Vec::with_capacity(*pages);
                for n in 1..=*pages {
                    let path = ctx.numbered_output(ctx.page_label, n, "png");
                    tokio::fs::write(&path, format!("page {}", n)).await?;
                    files.push(path);
                }
                Ok(BackendOutput::many(files)
                    .with_note(format!("{} {} images created", pages, ctx.page_label)))
            }
            MockBehavior::Fail(message) => Err(ConversionError::execution(message.clone())),
            MockBehavior::Corrupt(message) => Err(ConversionError::corrupt(message.clone())),
            MockBehavior::Unavailable => Err(ConversionError::tool_unavailable(self.descriptor.label)),
            MockBehavior::Panic(message) => panic!("{}", message),
            MockBehavior::Run { program, args } => {
                let spec = ctx
                    .process(program.clone(), TimeoutTier::Document)
                    .args(args.iter());
                ctx.run_tool(self.descriptor.label, spec).await?;
                let output = ctx.output_path();
                tokio::fs::write(&output, "done").await?;
                Ok(BackendOutput::single(output))
            }
        }
    }
}
