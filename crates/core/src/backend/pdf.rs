//! PDF backends: text extraction (lopdf, pdftotext) and page rasterization (pdftoppm).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::render::TextDocument;
use super::{require_source, require_tools, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

/// Rasterization resolution (2x of 72 DPI).
const RASTER_DPI: &str = "144";

/// Extracts page text with lopdf.
pub struct PdfTextBackend {
    descriptor: BackendDescriptor,
}

impl PdfTextBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("pdf-text", "PDF text extraction"),
        }
    }
}

impl Default for PdfTextBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PdfTextBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["pdf"])
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let title = ctx.stem.clone();
        let target = ctx.target;
        let output = ctx.output_path();
        let written = output.clone();

        ctx.host
            .run_blocking(move || -> Result<(), ConversionError> {
                let text = extract_pdf_text(&input)?;
                write_text(&written, &title, &text, target)
            })
            .await??;

        Ok(BackendOutput::single(output))
    }
}

/// Text of every page, pages separated by a blank line.
pub fn extract_pdf_text(path: &Path) -> Result<String, ConversionError> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| ConversionError::corrupt(format!("unreadable PDF: {}", e)))?;

    let mut text = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                text.push_str(page_text.trim_end());
                text.push_str("\n\n");
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping page {} of {:?}: {}", page, path, e),
        }
    }

    if text.trim().is_empty() {
        return Err(ConversionError::execution(
            "could not extract text from PDF (may be image-based)",
        ));
    }
    Ok(text)
}

fn write_text(
    output: &Path,
    title: &str,
    text: &str,
    target: TargetFormat,
) -> Result<(), ConversionError> {
    let bytes = match target {
        TargetFormat::Txt => text.as_bytes().to_vec(),
        other => TextDocument::from_plain_text(title, text).render(other)?,
    };
    std::fs::write(output, bytes)?;
    Ok(())
}

/// Extracts text with poppler's `pdftotext`.
pub struct PdftotextBackend {
    descriptor: BackendDescriptor,
}

impl PdftotextBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess("pdftotext", "pdftotext", Tool::Pdftotext),
        }
    }
}

impl Default for PdftotextBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PdftotextBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["pdf"])?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let program = ctx.tool(Tool::Pdftotext)?;
        let extracted = ctx.attempt_dir.join("pdftotext.out");

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .args(["-layout", "-enc", "UTF-8"])
            .arg(&ctx.input)
            .arg(&extracted);
        ctx.run_tool("pdftotext", spec).await?;

        let text = tokio::fs::read_to_string(&extracted).await.map_err(|e| {
            ConversionError::execution(format!("pdftotext output unreadable: {}", e))
        })?;
        if text.trim().is_empty() {
            return Err(ConversionError::execution(
                "could not extract text from PDF (may be image-based)",
            ));
        }

        let output = ctx.output_path();
        write_text(&output, &ctx.stem, &text, ctx.target)?;
        Ok(BackendOutput::single(output))
    }
}

/// Renders each page to an image with `pdftoppm`.
pub struct PdfRasterBackend {
    descriptor: BackendDescriptor,
}

impl PdfRasterBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess("pdf-raster", "pdftoppm", Tool::Pdftoppm),
        }
    }
}

impl Default for PdfRasterBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PdfRasterBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["pdf"])?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let (format_flag, ext) = match ctx.target {
            TargetFormat::Png => ("-png", "png"),
            TargetFormat::Jpg => ("-jpeg", "jpg"),
            other => {
                return Err(ConversionError::incompatible(format!(
                    "pages cannot be rasterized to {}",
                    other
                )))
            }
        };

        let program = ctx.tool(Tool::Pdftoppm)?;
        let raster_dir = ctx.attempt_dir.join("raster");
        tokio::fs::create_dir_all(&raster_dir).await?;

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .args(["-r", RASTER_DPI, format_flag])
            .arg(&ctx.input)
            .arg(raster_dir.join("page"));
        ctx.run_tool("pdftoppm", spec).await?;

        let pages = collect_pages(&raster_dir, ext).await?;
        if pages.is_empty() {
            return Err(ConversionError::execution("pdftoppm produced no pages"));
        }

        let mut files = Vec::with_capacity(pages.len());
        for (n, page) in pages.into_iter().enumerate() {
            let named = ctx.numbered_output(ctx.page_label, n + 1, ext);
            tokio::fs::rename(&page, &named).await?;
            files.push(named);
        }
        debug!("Rasterized {} pages from {:?}", files.len(), ctx.input);

        let note = format!("{} {} images created", files.len(), ctx.page_label);
        Ok(BackendOutput::many(files).with_note(note))
    }
}

/// `page-1.png`, `page-01.png`, ... sorted by page number.
async fn collect_pages(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, ConversionError> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(number) = page_number(&path) {
            pages.push((number, path));
        }
    }
    pages.sort();
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_text_from_every_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.pdf");
        fixtures::write_text_pdf(&path, &["First page", "Second page"]);

        let text = extract_pdf_text(&path).unwrap();
        assert!(text.contains("First page"));
        assert!(text.contains("Second page"));
        assert!(text.find("First").unwrap() < text.find("Second").unwrap());
    }

    #[test]
    fn test_garbage_pdf_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "this is not a pdf").unwrap();
        let err = extract_pdf_text(&path).unwrap_err();
        assert_eq!(err.class(), crate::engine::FailureClass::FatalInput);
    }

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number(Path::new("/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/x/page-012.jpg")), Some(12));
        assert_eq!(page_number(Path::new("/x/cover.png")), None);
    }

    #[tokio::test]
    async fn test_collect_pages_orders_numerically() {
        let dir = TempDir::new().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let pages = collect_pages(dir.path(), "png").await.unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }
}
