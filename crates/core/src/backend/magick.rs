//! ImageMagick fallback for images the native decoder cannot handle.

use async_trait::async_trait;

use super::{require_source, require_tools, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError, Quality};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

const ACCEPTED: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "gif", "ico", "tiff", "tif", "heic", "heif", "svg",
];

/// `magick <input> [options] <output>` (or legacy `convert`).
pub struct ImageMagickBackend {
    descriptor: BackendDescriptor,
}

impl ImageMagickBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess(
                "imagemagick",
                "ImageMagick",
                Tool::ImageMagick,
            ),
        }
    }
}

impl Default for ImageMagickBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ImageMagickBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, ACCEPTED)?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let program = ctx.tool(Tool::ImageMagick)?;
        let output = ctx.output_path();

        let mut spec = ctx.process(program, TimeoutTier::Document);
        if ctx.source.extension == "svg" {
            // Rasterize vectors at print density.
            spec = spec.args(["-density", "150"]);
        }
        spec = spec.arg(&ctx.input);
        spec = match ctx.target {
            TargetFormat::Jpg | TargetFormat::Webp | TargetFormat::Heic => {
                let quality = match ctx.quality {
                    Quality::High => "95",
                    Quality::Standard => "85",
                };
                spec.args(["-quality", quality])
            }
            TargetFormat::Ico => spec.args(["-resize", "256x256>"]),
            _ => spec,
        };
        spec = spec.arg(&output);

        ctx.run_tool("ImageMagick", spec).await?;
        Ok(BackendOutput::single(output))
    }
}
