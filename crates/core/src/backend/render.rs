//! Rendering extracted text to document formats.

use std::fmt::Write as _;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::engine::ConversionError;
use crate::format::TargetFormat;

/// One structural element of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading with level 1..=3.
    Heading { level: u8, text: String },
    Paragraph(String),
    /// Table rows; the first row is the header.
    Table(Vec<Vec<String>>),
}

/// Structured text ready to be written as txt, html, md, rtf or docx.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl TextDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    /// One paragraph per non-blank line.
    pub fn from_plain_text(title: impl Into<String>, text: &str) -> Self {
        let mut doc = Self::new(title);
        for line in text.lines() {
            let line = line.trim_end();
            if !line.trim().is_empty() {
                doc.blocks.push(Block::Paragraph(line.to_string()));
            }
        }
        doc
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Whether there is any visible text.
    pub fn is_blank(&self) -> bool {
        self.blocks.iter().all(|block| match block {
            Block::Heading { text, .. } | Block::Paragraph(text) => text.trim().is_empty(),
            Block::Table(rows) => rows.iter().flatten().all(|c| c.trim().is_empty()),
        })
    }

    /// Encodes the document in `target`.
    pub fn render(&self, target: TargetFormat) -> Result<Vec<u8>, ConversionError> {
        match target {
            TargetFormat::Txt => Ok(self.to_text().into_bytes()),
            TargetFormat::Html => Ok(self.to_html().into_bytes()),
            TargetFormat::Md => Ok(self.to_markdown().into_bytes()),
            TargetFormat::Rtf => Ok(self.to_rtf().into_bytes()),
            TargetFormat::Docx => self.to_docx(),
            other => Err(ConversionError::incompatible(format!(
                "text cannot be written as {}",
                other
            ))),
        }
    }

    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Heading { text, .. } | Block::Paragraph(text) => lines.push(text.clone()),
                Block::Table(rows) => {
                    for row in rows {
                        lines.push(row.join("\t"));
                    }
                }
            }
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn to_html(&self) -> String {
        let mut html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               max-width: 800px; margin: 40px auto; padding: 20px; line-height: 1.6; }}
        p {{ margin: 1em 0; }}
        table {{ border-collapse: collapse; width: 100%; margin: 1em 0; }}
        th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
        th {{ background-color: #f5f5f5; }}
    </style>
</head>
<body>
"#,
            escape_xml(&self.title)
        );

        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    let level = (*level).clamp(1, 3);
                    let _ = writeln!(html, "    <h{0}>{1}</h{0}>", level, escape_xml(text));
                }
                Block::Paragraph(text) => {
                    let _ = writeln!(html, "    <p>{}</p>", escape_xml(text));
                }
                Block::Table(rows) => {
                    html.push_str("    <table>\n");
                    for (i, row) in rows.iter().enumerate() {
                        let tag = if i == 0 { "th" } else { "td" };
                        html.push_str("        <tr>\n");
                        for cell in row {
                            let _ = writeln!(html, "            <{0}>{1}</{0}>", tag, escape_xml(cell));
                        }
                        html.push_str("        </tr>\n");
                    }
                    html.push_str("    </table>\n");
                }
            }
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n", self.title);
        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    let hashes = "#".repeat((*level).clamp(1, 3) as usize);
                    let _ = write!(md, "{} {}\n\n", hashes, text);
                }
                Block::Paragraph(text) => {
                    let _ = write!(md, "{}\n\n", text);
                }
                Block::Table(rows) => {
                    let Some(header) = rows.first() else {
                        continue;
                    };
                    let _ = writeln!(md, "| {} |", header.join(" | "));
                    let _ = writeln!(md, "| {} |", vec!["---"; header.len()].join(" | "));
                    for row in &rows[1..] {
                        let _ = writeln!(md, "| {} |", row.join(" | "));
                    }
                    md.push('\n');
                }
            }
        }
        md
    }

    pub fn to_rtf(&self) -> String {
        let mut rtf = String::from("{\\rtf1\\ansi\\deff0\n");
        for line in self.to_text().lines() {
            if !line.trim().is_empty() {
                let _ = writeln!(rtf, "\\par {}", escape_rtf(line));
            }
        }
        rtf.push('}');
        rtf
    }

    pub fn to_docx(&self) -> Result<Vec<u8>, ConversionError> {
        let mut body = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    let _ = write!(
                        body,
                        r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/></w:pPr>{}</w:p>"#,
                        (*level).clamp(1, 3),
                        docx_run(text)
                    );
                }
                Block::Paragraph(text) => {
                    let _ = write!(body, "<w:p>{}</w:p>", docx_run(text));
                }
                Block::Table(rows) => {
                    body.push_str("<w:tbl>");
                    for row in rows {
                        body.push_str("<w:tr>");
                        for cell in row {
                            let _ = write!(body, "<w:tc><w:p>{}</w:p></w:tc>", docx_run(cell));
                        }
                        body.push_str("</w:tr>");
                    }
                    body.push_str("</w:tbl>");
                }
            }
        }

        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            body
        );

        write_package(&[
            ("[Content_Types].xml", DOCX_CONTENT_TYPES),
            ("_rels/.rels", DOCX_RELS),
            ("word/document.xml", &document),
        ])
    }
}

const DOCX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const DOCX_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn docx_run(text: &str) -> String {
    format!(
        r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape_xml(text)
    )
}

/// Writes an OOXML package (a deflated zip of named parts) to memory.
pub(crate) fn write_package(parts: &[(&str, &str)]) -> Result<Vec<u8>, ConversionError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(*name, options)
            .map_err(|e| ConversionError::execution(format!("failed to write {}: {}", name, e)))?;
        zip.write_all(content.as_bytes())?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| ConversionError::execution(format!("failed to finish package: {}", e)))?;
    Ok(cursor.into_inner())
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn escape_rtf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\t' => out.push_str("\\tab "),
            c if c.is_ascii() => out.push(c),
            c => {
                // RTF \u takes a signed 16-bit value; astral chars become two units.
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{}?", *unit as i16);
                }
            }
        }
    }
    out
}
