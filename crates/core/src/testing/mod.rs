//! Testing utilities: a scripted backend and sample-file builders.
//!
//! These let the executor, dispatcher and HTTP layer be tested without any
//! external tool installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use omniconv_core::testing::{fixtures, MockBackend};
//!
//! fixtures::write_png(&dir.join("photo.png"), 64, 48);
//! let backend = MockBackend::failing("flaky", "Flaky", "exit status 1");
//! ```

mod mock_backend;

pub use mock_backend::{MockBackend, MockBehavior};

/// Test fixtures: small but structurally valid input files.
pub mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::fmt::Write as _;
    use std::io::{Cursor, Write};
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
    const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// PNG bytes of a `width` x `height` gradient.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode PNG fixture");
        bytes
    }

    /// Writes a gradient PNG.
    pub fn write_png(path: &Path, width: u32, height: u32) {
        std::fs::write(path, png_bytes(width, height)).expect("write PNG fixture");
    }

    /// Writes a zip with the given entries.
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).expect("create zip fixture");
        let mut zip = ZipWriter::new(file);
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default())
                .expect("start zip entry");
            zip.write_all(bytes).expect("write zip entry");
        }
        zip.finish().expect("finish zip fixture");
    }

    /// Writes a CSV file from rows.
    pub fn write_csv(path: &Path, rows: &[Vec<String>]) {
        let mut writer = csv::Writer::from_path(path).expect("create CSV fixture");
        for row in rows {
            writer.write_record(row).expect("write CSV row");
        }
        writer.flush().expect("flush CSV fixture");
    }

    /// Writes a DOCX with styled paragraphs (`(style, text)`, empty style for
    /// body text) followed by one table.
    pub fn write_docx(path: &Path, paragraphs: &[(&str, &str)], table: &[&[&str]]) {
        let mut body = String::new();
        for (style, text) in paragraphs {
            body.push_str("<w:p>");
            if !style.is_empty() {
                let _ = write!(body, r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, style);
            }
            let _ = write!(body, "<w:r><w:t>{}</w:t></w:r></w:p>", text);
        }
        if !table.is_empty() {
            body.push_str("<w:tbl>");
            for row in table {
                body.push_str("<w:tr>");
                for cell in row.iter() {
                    let _ = write!(body, "<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>", cell);
                }
                body.push_str("</w:tr>");
            }
            body.push_str("</w:tbl>");
        }

        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            W_NS, body
        );
        write_zip(
            path,
            &[
                ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
                ("word/document.xml", document.as_bytes()),
            ],
        );
    }

    /// Writes a PPTX with one text paragraph per entry of each slide and
    /// the given files under `ppt/media/`.
    pub fn write_pptx(path: &Path, slides: &[&[&str]], media: &[(&str, &[u8])]) {
        let mut parts: Vec<(String, Vec<u8>)> = vec![(
            "[Content_Types].xml".to_string(),
            CONTENT_TYPES.as_bytes().to_vec(),
        )];

        for (i, paragraphs) in slides.iter().enumerate() {
            let mut body = String::new();
            for text in paragraphs.iter() {
                let _ = write!(body, "<a:p><a:r><a:t>{}</a:t></a:r></a:p>", text);
            }
            let slide = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="{}" xmlns:p="{}"><p:cSld><p:spTree><p:sp><p:txBody>{}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
                A_NS, P_NS, body
            );
            parts.push((format!("ppt/slides/slide{}.xml", i + 1), slide.into_bytes()));
        }
        for (name, bytes) in media {
            parts.push((format!("ppt/media/{}", name), bytes.to_vec()));
        }

        let entries: Vec<(&str, &[u8])> = parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();
        write_zip(path, &entries);
    }

    /// Writes a PDF with one line of text per page.
    pub fn write_text_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::with_capacity(pages.len());
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode PDF content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("write PDF fixture");
    }

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;
}
