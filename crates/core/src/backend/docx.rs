//! Native DOCX text extraction.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::ooxml::{is_element, parse_xml, Package, W_NS};
use super::render::{Block, TextDocument};
use super::{require_source, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::SourceFormat;
use crate::host::ConcurrencyHost;

/// Reads `word/document.xml` and renders txt, html or md, keeping headings and tables.
pub struct DocxTextBackend {
    descriptor: BackendDescriptor,
}

impl DocxTextBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("docx-native", "DOCX reader"),
        }
    }
}

impl Default for DocxTextBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for DocxTextBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, &["docx"])
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let title = ctx.stem.clone();
        let target = ctx.target;
        let output = ctx.output_path();

        let written = output.clone();
        ctx.host
            .run_blocking(move || -> Result<(), ConversionError> {
                let doc = read_docx(&input, &title)?;
                if doc.is_blank() {
                    return Err(ConversionError::execution("document contains no text"));
                }
                std::fs::write(&written, doc.render(target)?)?;
                Ok(())
            })
            .await??;

        debug!("Extracted DOCX text to {:?}", output);
        Ok(BackendOutput::single(output))
    }
}

/// Parses a DOCX body into blocks in document order.
pub fn read_docx(path: &Path, title: &str) -> Result<TextDocument, ConversionError> {
    let mut package = Package::open(path)?;
    let xml = package.required_text("word/document.xml")?;
    let tree = parse_xml("word/document.xml", &xml)?;

    let body = tree
        .descendants()
        .find(|n| is_element(n, W_NS, "body"))
        .ok_or_else(|| ConversionError::corrupt("document has no body"))?;

    let mut doc = TextDocument::new(title);
    for node in body.children() {
        if is_element(&node, W_NS, "p") {
            let text = paragraph_text(&node);
            if text.trim().is_empty() {
                continue;
            }
            match heading_level(&node) {
                Some(level) => doc.push(Block::Heading { level, text }),
                None => doc.push(Block::Paragraph(text)),
            }
        } else if is_element(&node, W_NS, "tbl") {
            let rows: Vec<Vec<String>> = node
                .children()
                .filter(|n| is_element(n, W_NS, "tr"))
                .map(|row| {
                    row.children()
                        .filter(|n| is_element(n, W_NS, "tc"))
                        .map(|cell| {
                            cell.descendants()
                                .filter(|n| is_element(n, W_NS, "p"))
                                .map(|p| paragraph_text(&p))
                                .collect::<Vec<_>>()
                                .join(" ")
                                .trim()
                                .to_string()
                        })
                        .collect()
                })
                .collect();
            if !rows.is_empty() {
                doc.push(Block::Table(rows));
            }
        }
    }
    Ok(doc)
}

fn paragraph_text(paragraph: &roxmltree::Node<'_, '_>) -> String {
    let mut text = String::new();
    for node in paragraph.descendants() {
        if is_element(&node, W_NS, "t") {
            text.push_str(node.text().unwrap_or_default());
        } else if is_element(&node, W_NS, "tab") {
            text.push('\t');
        } else if is_element(&node, W_NS, "br") {
            text.push('\n');
        }
    }
    text
}

/// Heading level from the paragraph style (`Title`, `Heading1`..`Heading3`).
fn heading_level(paragraph: &roxmltree::Node<'_, '_>) -> Option<u8> {
    let style = paragraph
        .children()
        .find(|n| is_element(n, W_NS, "pPr"))?
        .children()
        .find(|n| is_element(n, W_NS, "pStyle"))?
        .attribute((W_NS, "val"))?;

    let normalized: String = style.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = normalized.to_ascii_lowercase();
    if normalized == "title" {
        return Some(1);
    }
    match normalized.strip_prefix("heading")?.parse::<u8>().ok()? {
        level @ 1..=3 => Some(level),
        _ => None,
    }
}
