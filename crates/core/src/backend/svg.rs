//! SVG rasterizers.

use async_trait::async_trait;

use super::{require_source, require_tools, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

fn vector_format(target: TargetFormat) -> Result<&'static str, ConversionError> {
    match target {
        TargetFormat::Png => Ok("png"),
        TargetFormat::Pdf => Ok("pdf"),
        other => Err(ConversionError::incompatible(format!(
            "SVG can only be converted to PNG or PDF, not {}",
            other
        ))),
    }
}

/// `rsvg-convert -f <fmt> -o <out> <in>`
pub struct RsvgBackend {
    descriptor: BackendDescriptor,
}

impl RsvgBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess(
                "rsvg-convert",
                "rsvg-convert",
                Tool::RsvgConvert,
            ),
        }
    }
}

impl Default for RsvgBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for RsvgBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["svg"])?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let format = vector_format(ctx.target)?;
        let program = ctx.tool(Tool::RsvgConvert)?;
        let output = ctx.output_path();

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .args(["-f", format, "-o"])
            .arg(&output)
            .arg(&ctx.input);
        ctx.run_tool("rsvg-convert", spec).await?;

        Ok(BackendOutput::single(output))
    }
}

/// `inkscape <in> --export-type=<fmt> --export-filename=<out>`
pub struct InkscapeBackend {
    descriptor: BackendDescriptor,
}

impl InkscapeBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess("inkscape", "Inkscape", Tool::Inkscape),
        }
    }
}

impl Default for InkscapeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InkscapeBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["svg"])?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let format = vector_format(ctx.target)?;
        let program = ctx.tool(Tool::Inkscape)?;
        let output = ctx.output_path();

        let mut export_filename = std::ffi::OsString::from("--export-filename=");
        export_filename.push(&output);

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .arg(&ctx.input)
            .arg(format!("--export-type={}", format))
            .arg(export_filename);
        ctx.run_tool("Inkscape", spec).await?;

        Ok(BackendOutput::single(output))
    }
}
