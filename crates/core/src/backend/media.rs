//! FFmpeg-based audio/video transcoding.

use async_trait::async_trait;
use std::path::Path;

use super::{require_source, require_tools, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError, Quality};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

const ACCEPTED: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "webm", "flv", "wmv", "m4v", "mp3", "wav", "flac", "aac", "ogg",
    "m4a", "opus", "wma",
];

/// Transcodes with `ffmpeg` under the media timeout tier.
pub struct FfmpegBackend {
    descriptor: BackendDescriptor,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess("ffmpeg", "FFmpeg", Tool::Ffmpeg),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for FfmpegBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, ACCEPTED)?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let program = ctx.tool(Tool::Ffmpeg)?;
        let output = ctx.output_path();
        let args = build_args(&ctx.input, &output, ctx.target, ctx.quality)?;

        let spec = ctx.process(program, TimeoutTier::Media).args(args);
        ctx.run_tool("FFmpeg", spec).await?;

        Ok(BackendOutput::single(output))
    }
}

/// Builds ffmpeg arguments for a target format.
fn build_args(
    input: &Path,
    output: &Path,
    target: TargetFormat,
    quality: Quality,
) -> Result<Vec<String>, ConversionError> {
    let mut args = vec![
        "-y".to_string(), // Overwrite output
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    let codec_args: &[&str] = match target {
        // Audio: drop any video stream
        TargetFormat::Mp3 => &["-vn", "-c:a", "libmp3lame", "-b:a", "192k"],
        TargetFormat::Wav => &["-vn", "-c:a", "pcm_s16le", "-ar", "44100"],
        TargetFormat::Aac | TargetFormat::M4a => &["-vn", "-c:a", "aac", "-b:a", "192k"],
        TargetFormat::Ogg => &["-vn", "-c:a", "libvorbis", "-q:a", "5"],
        TargetFormat::Flac => &["-vn", "-c:a", "flac"],
        TargetFormat::Opus => &["-vn", "-c:a", "libopus", "-b:a", "128k"],

        TargetFormat::Gif => &["-vf", "fps=10,scale=480:-1:flags=lanczos"],

        TargetFormat::Mp4 => match quality {
            Quality::High => &[
                "-c:v", "libx264", "-c:a", "aac", "-movflags", "faststart", "-crf", "18",
                "-preset", "slow",
            ],
            Quality::Standard => &[
                "-c:v", "libx264", "-c:a", "aac", "-movflags", "faststart", "-crf", "23",
                "-preset", "veryfast",
            ],
        },
        TargetFormat::Webm => &["-c:v", "libvpx-vp9", "-c:a", "libopus", "-b:v", "2M"],
        TargetFormat::Avi => &["-c:v", "mpeg4", "-c:a", "libmp3lame", "-q:v", "5"],
        TargetFormat::Mkv | TargetFormat::Mov => &["-c:v", "libx264", "-c:a", "aac"],

        other => {
            return Err(ConversionError::incompatible(format!(
                "media cannot be written as {}",
                other
            )))
        }
    };
    args.extend(codec_args.iter().map(|a| a.to_string()));

    args.extend(["-loglevel".to_string(), "error".to_string()]);

    // Output
    args.push(output.to_string_lossy().to_string());

    Ok(args)
}
