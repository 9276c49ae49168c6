//! Native PPTX readers: slide text and embedded media.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::ooxml::{is_element, parse_xml, part_number, Package, A_NS};
use super::{require_source, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::ConcurrencyHost;

const SLIDE_PREFIX: &str = "ppt/slides/slide";
const MEDIA_PREFIX: &str = "ppt/media/";
const MEDIA_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Writes slide text as `=== Slide n ===` sections.
pub struct PptxTextBackend {
    descriptor: BackendDescriptor,
}

impl PptxTextBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("pptx-native", "PPTX reader"),
        }
    }
}

impl Default for PptxTextBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PptxTextBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["pptx"])
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        if ctx.target != TargetFormat::Txt {
            return Err(ConversionError::incompatible(format!(
                "slide text cannot be written as {}",
                ctx.target
            )));
        }
        let input = ctx.input.clone();
        let output = ctx.output_path();
        let written = output.clone();

        ctx.host
            .run_blocking(move || -> Result<(), ConversionError> {
                let slides = read_slide_text(&input)?;
                if slides.iter().all(|s| s.is_empty()) {
                    return Err(ConversionError::execution("presentation contains no text"));
                }
                std::fs::write(&written, format_slides(&slides))?;
                Ok(())
            })
            .await??;

        Ok(BackendOutput::single(output))
    }
}

/// Extracts embedded slide images when rasterization is not available.
pub struct PptxMediaBackend {
    descriptor: BackendDescriptor,
}

impl PptxMediaBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("pptx-media", "PPTX image extraction"),
        }
    }
}

impl Default for PptxMediaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PptxMediaBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["pptx"])
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let dir = ctx.attempt_dir.clone();
        let stem = ctx.stem.clone();

        let files = ctx
            .host
            .run_blocking(move || extract_media(&input, &dir, &stem))
            .await??;

        if files.is_empty() {
            return Err(ConversionError::execution(
                "presentation contains no embedded images",
            ));
        }
        let note = format!("{} images extracted from presentation", files.len());
        Ok(BackendOutput::many(files).with_note(note))
    }
}

/// Text of each slide in slide order; one entry per paragraph.
pub fn read_slide_text(path: &Path) -> Result<Vec<Vec<String>>, ConversionError> {
    let mut package = Package::open(path)?;
    let mut slide_parts: Vec<(usize, String)> = package
        .names()
        .into_iter()
        .filter_map(|name| part_number(&name, SLIDE_PREFIX).map(|n| (n, name)))
        .collect();
    slide_parts.sort();

    let mut slides = Vec::with_capacity(slide_parts.len());
    for (_, name) in slide_parts {
        let xml = package.required_text(&name)?;
        let tree = parse_xml(&name, &xml)?;
        let paragraphs = tree
            .descendants()
            .filter(|n| is_element(n, A_NS, "p"))
            .map(|p| {
                p.descendants()
                    .filter(|n| is_element(n, A_NS, "t"))
                    .filter_map(|t| t.text())
                    .collect::<String>()
            })
            .filter(|text| !text.trim().is_empty())
            .collect();
        slides.push(paragraphs);
    }
    Ok(slides)
}

fn format_slides(slides: &[Vec<String>]) -> String {
    let mut lines = Vec::new();
    for (i, paragraphs) in slides.iter().enumerate() {
        lines.push(format!("=== Slide {} ===", i + 1));
        lines.push(String::new());
        lines.extend(paragraphs.iter().cloned());
        lines.push(String::new());
    }
    lines.join("\n")
}

fn extract_media(input: &Path, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, ConversionError> {
    let mut package = Package::open(input)?;
    let mut media: Vec<(String, String)> = package
        .names()
        .into_iter()
        .filter(|name| name.starts_with(MEDIA_PREFIX))
        .filter_map(|name| {
            let ext = Path::new(&name)
                .extension()?
                .to_str()?
                .to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str()).then_some((name, ext))
        })
        .collect();
    media.sort_by_key(|(name, _)| media_order(name));

    let mut files = Vec::with_capacity(media.len());
    for (n, (name, ext)) in media.iter().enumerate() {
        let path = dir.join(format!("{}_image_{}.{}", stem, n + 1, ext));
        std::fs::write(&path, package.bytes(name)?)?;
        files.push(path);
    }
    Ok(files)
}

/// Sorts `image2.png` before `image10.png`.
fn media_order(name: &str) -> (usize, String) {
    let digits: String = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    (digits.parse().unwrap_or(usize::MAX), name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_slide_text_in_slide_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        fixtures::write_pptx(
            &path,
            &[&["Intro", "Welcome"], &["Roadmap"]],
            &[],
        );

        let slides = read_slide_text(&path).unwrap();
        assert_eq!(slides, vec![vec!["Intro", "Welcome"], vec!["Roadmap"]]);
        assert_eq!(
            format_slides(&slides),
            "=== Slide 1 ===\n\nIntro\nWelcome\n\n=== Slide 2 ===\n\nRoadmap\n"
        );
    }

    #[test]
    fn test_extracts_media_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        let png = fixtures::png_bytes(2, 2);
        fixtures::write_pptx(
            &path,
            &[&["Only slide"]],
            &[
                ("image10.png", png.as_slice()),
                ("image2.jpeg", b"jpeg-bytes".as_slice()),
                ("audio1.wav", b"riff".as_slice()),
            ],
        );

        let out = TempDir::new().unwrap();
        let files = extract_media(&path, out.path(), "deck").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["deck_image_1.jpeg", "deck_image_2.png"]);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"jpeg-bytes");
    }
}
