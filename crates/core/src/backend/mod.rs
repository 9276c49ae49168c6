//! Conversion backends.
//!
//! Every conversion method sits behind the [`Backend`] trait: library calls
//! run on the worker pool, external tools run as supervised subprocesses, and
//! pipelines chain two backends through an intermediate format.

mod archive;
mod docx;
mod image;
mod magick;
mod media;
mod office;
mod ooxml;
mod pdf;
mod pipeline;
mod pptx;
mod render;
mod svg;
mod tabular;

pub use archive::{NativeArchiveBackend, SevenZipBackend};
pub use docx::DocxTextBackend;
pub use image::NativeImageBackend;
pub use magick::ImageMagickBackend;
pub use media::FfmpegBackend;
pub use office::{LibreOfficeBackend, OfficeApp, OfficeAutomationBackend};
pub use pdf::{PdfRasterBackend, PdfTextBackend, PdftotextBackend};
pub use pipeline::PipelineBackend;
pub use pptx::{PptxMediaBackend, PptxTextBackend};
pub use render::{Block, TextDocument};
pub use svg::{InkscapeBackend, RsvgBackend};
pub use tabular::TabularBackend;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{BackendOutput, ConversionError, Quality};
use crate::format::{FormatFamily, SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, ProcessOutput, ProcessSpec, TimeoutTier, Tool};

/// How a backend performs its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    LibraryCall,
    Subprocess,
    Pipeline,
}

/// Static description of a backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendDescriptor {
    /// Stable identifier, used in logs and metrics.
    pub id: &'static str,
    /// Human-readable name, used in "requires one of" messages.
    pub label: &'static str,
    pub kind: MethodKind,
    /// External tools the backend needs.
    pub tools: Vec<Tool>,
}

impl BackendDescriptor {
    pub fn library(id: &'static str, label: &'static str) -> Self {
        Self {
            id,
            label,
            kind: MethodKind::LibraryCall,
            tools: Vec::new(),
        }
    }

    pub fn subprocess(id: &'static str, label: &'static str, tool: Tool) -> Self {
        Self {
            id,
            label,
            kind: MethodKind::Subprocess,
            tools: vec![tool],
        }
    }
}

/// Everything a backend needs for one attempt.
#[derive(Clone)]
pub struct AttemptContext {
    pub input: PathBuf,
    pub source: SourceFormat,
    pub target: TargetFormat,
    pub quality: Quality,
    /// Sanitized stem used to name outputs.
    pub stem: String,
    /// Fresh directory owned by this attempt.
    pub attempt_dir: PathBuf,
    /// Word used for multi-output names: `page` or `slide`.
    pub page_label: &'static str,
    pub host: Arc<ConcurrencyHost>,
}

impl AttemptContext {
    /// `<attempt_dir>/<stem>.<ext>`
    pub fn output_path(&self) -> PathBuf {
        self.attempt_dir.join(self.target.file_name(&self.stem))
    }

    /// `<attempt_dir>/<stem>_<label>_<n>.<ext>`
    pub fn numbered_output(&self, label: &str, n: usize, ext: &str) -> PathBuf {
        self.attempt_dir
            .join(format!("{}_{}_{}.{}", self.stem, label, n, ext))
    }

    /// Context for one stage of a pipeline.
    pub fn stage(
        &self,
        input: PathBuf,
        source: SourceFormat,
        target: TargetFormat,
        attempt_dir: PathBuf,
    ) -> Self {
        Self {
            input,
            source,
            target,
            attempt_dir,
            ..self.clone()
        }
    }

    /// Resolves a tool or reports it as unavailable.
    pub fn tool(&self, tool: Tool) -> Result<PathBuf, ConversionError> {
        self.host
            .locator()
            .resolve(tool)
            .ok_or_else(|| ConversionError::tool_unavailable(tool.label()))
    }

    /// Runs a tool and turns a non-zero exit into an execution failure.
    pub async fn run_tool(
        &self,
        label: &str,
        spec: ProcessSpec,
    ) -> Result<ProcessOutput, ConversionError> {
        let output = self.host.run_process(spec).await?;
        if output.success() {
            return Ok(output);
        }
        let code = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        Err(ConversionError::execution_with_detail(
            format!("{} exited with {}", label, code),
            detail.clone(),
        ))
    }

    /// Process spec for `tool` using the timeout tier.
    pub fn process(&self, program: PathBuf, tier: TimeoutTier) -> ProcessSpec {
        ProcessSpec::new(program, self.host.timeout(tier))
    }
}

/// A single conversion method.
#[async_trait]
pub trait Backend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    /// Cheap precondition probe run before an attempt.
    ///
    /// Must fail with a precondition error (tool missing, platform,
    /// source not accepted) and never touch the input.
    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError>;

    /// Performs the conversion, writing outputs into `ctx.attempt_dir`.
    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError>;
}

/// Fails unless the source extension is one of `accepted`.
pub(crate) fn require_source(
    descriptor: &BackendDescriptor,
    source: &SourceFormat,
    accepted: &[&str],
) -> Result<(), ConversionError> {
    if source.is_one_of(accepted) {
        Ok(())
    } else {
        Err(ConversionError::SourceNotAccepted {
            backend: descriptor.label,
            extension: source.extension.clone(),
        })
    }
}

/// Fails unless every tool in the descriptor resolves.
pub(crate) fn require_tools(
    descriptor: &BackendDescriptor,
    host: &ConcurrencyHost,
) -> Result<(), ConversionError> {
    for tool in &descriptor.tools {
        if !host.locator().is_available(*tool) {
            return Err(ConversionError::tool_unavailable(tool.label()));
        }
    }
    Ok(())
}

/// Word used for multi-output file names for a source family.
pub fn page_label(family: FormatFamily) -> &'static str {
    match family {
        FormatFamily::Presentation => "slide",
        _ => "page",
    }
}

/// Moves a file produced under a tool-chosen name to the expected path.
pub(crate) async fn adopt_output(produced: &Path, expected: &Path) -> Result<(), ConversionError> {
    if produced == expected {
        return Ok(());
    }
    if !tokio::fs::try_exists(produced).await.unwrap_or(false) {
        return Err(ConversionError::execution(format!(
            "expected output {} was not created",
            produced
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        )));
    }
    tokio::fs::rename(produced, expected).await?;
    Ok(())
}
