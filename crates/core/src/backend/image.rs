//! Native raster image conversion with the `image` crate.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{require_source, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError, Quality};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::ConcurrencyHost;

const ACCEPTED: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "ico", "tiff", "tif"];

/// Largest ICO edge.
const ICO_MAX_EDGE: u32 = 256;

/// Resolution assumed when placing an image on a PDF page.
const PDF_DPI: f32 = 100.0;

/// Decodes with `image` and re-encodes in the target format.
pub struct NativeImageBackend {
    descriptor: BackendDescriptor,
}

impl NativeImageBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("native-image", "image library"),
        }
    }
}

impl Default for NativeImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for NativeImageBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, ACCEPTED)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let target = ctx.target;
        let quality = ctx.quality;
        let output = ctx.output_path();
        let written = output.clone();

        ctx.host
            .run_blocking(move || convert_image(&input, &written, target, quality))
            .await??;

        Ok(BackendOutput::single(output))
    }
}

fn jpeg_quality(quality: Quality) -> u8 {
    match quality {
        Quality::High => 95,
        Quality::Standard => 85,
    }
}

/// Converts one image file. Malformed input is reported as corrupt; a format
/// the image library was built without is left to the next backend.
pub fn convert_image(
    input: &Path,
    output: &Path,
    target: TargetFormat,
    quality: Quality,
) -> Result<(), ConversionError> {
    let img = ImageReader::open(input)?
        .with_guessed_format()?
        .decode()
        .map_err(decode_error)?;

    match target {
        TargetFormat::Jpg => {
            let rgb = img.to_rgb8();
            let mut writer = BufWriter::new(File::create(output)?);
            JpegEncoder::new_with_quality(&mut writer, jpeg_quality(quality))
                .encode_image(&rgb)
                .map_err(encode_error)?;
        }
        TargetFormat::Bmp => {
            DynamicImage::ImageRgb8(img.to_rgb8())
                .save_with_format(output, ImageFormat::Bmp)
                .map_err(encode_error)?;
        }
        TargetFormat::Ico => {
            let icon = if img.width() > ICO_MAX_EDGE || img.height() > ICO_MAX_EDGE {
                img.thumbnail(ICO_MAX_EDGE, ICO_MAX_EDGE)
            } else {
                img
            };
            DynamicImage::ImageRgba8(icon.to_rgba8())
                .save_with_format(output, ImageFormat::Ico)
                .map_err(encode_error)?;
        }
        TargetFormat::Webp => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .save_with_format(output, ImageFormat::WebP)
                .map_err(encode_error)?;
        }
        TargetFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .save_with_format(output, ImageFormat::Gif)
                .map_err(encode_error)?;
        }
        TargetFormat::Png => img
            .save_with_format(output, ImageFormat::Png)
            .map_err(encode_error)?,
        TargetFormat::Tiff => img
            .save_with_format(output, ImageFormat::Tiff)
            .map_err(encode_error)?,
        TargetFormat::Pdf => write_image_pdf(&img, output, quality)?,
        other => {
            return Err(ConversionError::incompatible(format!(
                "images cannot be written as {}",
                other
            )))
        }
    }
    Ok(())
}

fn decode_error(e: image::ImageError) -> ConversionError {
    match e {
        image::ImageError::Unsupported(_) => {
            ConversionError::execution(format!("image library cannot read this file: {}", e))
        }
        e => ConversionError::corrupt(format!("cannot decode image: {}", e)),
    }
}

fn encode_error(e: image::ImageError) -> ConversionError {
    ConversionError::execution(format!("failed to encode image: {}", e))
}

/// Writes a single-page PDF with the image embedded as JPEG.
fn write_image_pdf(img: &DynamicImage, output: &Path, quality: Quality) -> Result<(), ConversionError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality(quality))
        .encode_image(&rgb)
        .map_err(encode_error)?;

    let page_width = width as f32 * 72.0 / PDF_DPI;
    let page_height = height as f32 * 72.0 / PDF_DPI;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false),
    );

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    page_width.into(),
                    0.into(),
                    0.into(),
                    page_height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| ConversionError::execution(format!("failed to build PDF page: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
        "Contents" => content_id,
        "Resources" => resources_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(output)
        .map_err(|e| ConversionError::execution(format!("failed to write PDF: {}", e)))?;
    Ok(())
}
