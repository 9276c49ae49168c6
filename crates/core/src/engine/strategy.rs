//! Static routing from (family, profile, target) to ordered backend candidates.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{
    Backend, DocxTextBackend, FfmpegBackend, ImageMagickBackend, InkscapeBackend,
    LibreOfficeBackend, NativeArchiveBackend, NativeImageBackend, OfficeApp,
    OfficeAutomationBackend, PdfRasterBackend, PdfTextBackend, PdftotextBackend,
    PipelineBackend, PptxMediaBackend, PptxTextBackend, RsvgBackend, SevenZipBackend,
    TabularBackend,
};
use crate::format::{FormatFamily, SourceFormat, SourceProfile, TargetFormat};

type Key = (FormatFamily, SourceProfile, TargetFormat);

const RASTER_TARGETS: &[TargetFormat] = &[
    TargetFormat::Png,
    TargetFormat::Jpg,
    TargetFormat::Webp,
    TargetFormat::Bmp,
    TargetFormat::Gif,
    TargetFormat::Ico,
    TargetFormat::Tiff,
];

const AUDIO_TARGETS: &[TargetFormat] = &[
    TargetFormat::Mp3,
    TargetFormat::Wav,
    TargetFormat::Aac,
    TargetFormat::Ogg,
    TargetFormat::Flac,
    TargetFormat::M4a,
    TargetFormat::Opus,
];

const VIDEO_TARGETS: &[TargetFormat] = &[
    TargetFormat::Mp4,
    TargetFormat::Webm,
    TargetFormat::Avi,
    TargetFormat::Mkv,
    TargetFormat::Mov,
    TargetFormat::Gif,
];

const TABULAR_TARGETS: &[TargetFormat] = &[
    TargetFormat::Csv,
    TargetFormat::Xlsx,
    TargetFormat::Json,
    TargetFormat::Txt,
];

const ARCHIVE_TARGETS: &[TargetFormat] = &[
    TargetFormat::Zip,
    TargetFormat::Tar,
    TargetFormat::TarGz,
    TargetFormat::Tgz,
    TargetFormat::Gz,
];

/// Ordered candidate lists, built once and shared read-only.
///
/// Within a list, backends without external dependencies come first, then
/// cross-platform tools, then Windows-only automation.
#[derive(Default)]
pub struct StrategyTable {
    entries: HashMap<Key, Vec<Arc<dyn Backend>>>,
}

impl StrategyTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The full routing table over every built-in backend.
    pub fn standard() -> Self {
        use FormatFamily::*;
        use SourceProfile::{Standard, Vector};

        let native_image: Arc<dyn Backend> = Arc::new(NativeImageBackend::new());
        let magick: Arc<dyn Backend> = Arc::new(ImageMagickBackend::new());
        let rsvg: Arc<dyn Backend> = Arc::new(RsvgBackend::new());
        let inkscape: Arc<dyn Backend> = Arc::new(InkscapeBackend::new());
        let ffmpeg: Arc<dyn Backend> = Arc::new(FfmpegBackend::new());
        let libreoffice: Arc<dyn Backend> = Arc::new(LibreOfficeBackend::new());
        let word: Arc<dyn Backend> = Arc::new(OfficeAutomationBackend::new(OfficeApp::Word));
        let powerpoint: Arc<dyn Backend> =
            Arc::new(OfficeAutomationBackend::new(OfficeApp::PowerPoint));
        let docx_text: Arc<dyn Backend> = Arc::new(DocxTextBackend::new());
        let pdf_text: Arc<dyn Backend> = Arc::new(PdfTextBackend::new());
        let pdftotext: Arc<dyn Backend> = Arc::new(PdftotextBackend::new());
        let pdf_raster: Arc<dyn Backend> = Arc::new(PdfRasterBackend::new());
        let pptx_text: Arc<dyn Backend> = Arc::new(PptxTextBackend::new());
        let pptx_media: Arc<dyn Backend> = Arc::new(PptxMediaBackend::new());
        let tabular: Arc<dyn Backend> = Arc::new(TabularBackend::new());
        let native_archive: Arc<dyn Backend> = Arc::new(NativeArchiveBackend::new());
        let seven_zip: Arc<dyn Backend> = Arc::new(SevenZipBackend::new());

        let libreoffice_raster: Arc<dyn Backend> = Arc::new(PipelineBackend::new(
            "libreoffice-raster",
            "LibreOffice + pdftoppm",
            libreoffice.clone(),
            TargetFormat::Pdf,
            pdf_raster.clone(),
        ));
        let powerpoint_raster: Arc<dyn Backend> = Arc::new(PipelineBackend::new(
            "powerpoint-raster",
            "Microsoft PowerPoint + pdftoppm",
            powerpoint.clone(),
            TargetFormat::Pdf,
            pdf_raster.clone(),
        ));
        let libreoffice_tabular: Arc<dyn Backend> = Arc::new(PipelineBackend::new(
            "libreoffice-tabular",
            "LibreOffice + spreadsheet reader",
            libreoffice.clone(),
            TargetFormat::Xlsx,
            tabular.clone(),
        ));

        let mut table = Self::empty();

        // Images
        table.insert(Image, Standard, RASTER_TARGETS, &[native_image.clone(), magick.clone()]);
        table.insert(
            Image,
            Standard,
            &[TargetFormat::Pdf],
            &[native_image, magick.clone()],
        );
        table.insert(Image, Standard, &[TargetFormat::Heic], &[magick.clone()]);
        table.insert(
            Image,
            Vector,
            &[TargetFormat::Png, TargetFormat::Pdf],
            &[rsvg, inkscape, magick],
        );

        // Audio / video
        table.insert(AudioVideo, Standard, AUDIO_TARGETS, &[ffmpeg.clone()]);
        table.insert(AudioVideo, Standard, VIDEO_TARGETS, &[ffmpeg]);

        // Documents
        table.insert(
            Document,
            Standard,
            &[TargetFormat::Pdf],
            &[libreoffice.clone(), word],
        );
        table.insert(
            Document,
            Standard,
            &[TargetFormat::Txt, TargetFormat::Html],
            &[
                docx_text.clone(),
                pdf_text.clone(),
                pdftotext.clone(),
                libreoffice.clone(),
            ],
        );
        // LibreOffice has no Markdown export.
        table.insert(
            Document,
            Standard,
            &[TargetFormat::Md],
            &[docx_text, pdf_text.clone(), pdftotext.clone()],
        );
        table.insert(
            Document,
            Standard,
            &[TargetFormat::Rtf, TargetFormat::Docx],
            &[pdf_text, pdftotext, libreoffice.clone()],
        );
        table.insert(
            Document,
            Standard,
            &[TargetFormat::Png, TargetFormat::Jpg],
            &[pdf_raster, libreoffice_raster.clone()],
        );

        // Presentations
        table.insert(
            Presentation,
            Standard,
            &[TargetFormat::Pdf],
            &[libreoffice, powerpoint],
        );
        table.insert(
            Presentation,
            Standard,
            &[TargetFormat::Png, TargetFormat::Jpg],
            &[libreoffice_raster, powerpoint_raster, pptx_media],
        );
        table.insert(Presentation, Standard, &[TargetFormat::Txt], &[pptx_text]);

        // Spreadsheets
        table.insert(
            Spreadsheet,
            Standard,
            TABULAR_TARGETS,
            &[tabular, libreoffice_tabular],
        );

        // Archives
        table.insert(
            Archive,
            Standard,
            ARCHIVE_TARGETS,
            &[native_archive, seven_zip.clone()],
        );
        table.insert(Archive, Standard, &[TargetFormat::SevenZ], &[seven_zip]);

        table
    }

    /// Adds `candidates` (in order) for every target in `targets`.
    pub fn insert(
        &mut self,
        family: FormatFamily,
        profile: SourceProfile,
        targets: &[TargetFormat],
        candidates: &[Arc<dyn Backend>],
    ) {
        for target in targets {
            self.entries
                .insert((family, profile, *target), candidates.to_vec());
        }
    }

    /// Candidates for a classified source and target, in precedence order.
    pub fn candidates_for(&self, source: &SourceFormat, target: TargetFormat) -> &[Arc<dyn Backend>] {
        self.entries
            .get(&(source.family, source.profile, target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Targets reachable from a family and profile, in canonical order.
    pub fn targets_for(&self, family: FormatFamily, profile: SourceProfile) -> Vec<TargetFormat> {
        TargetFormat::ALL
            .iter()
            .copied()
            .filter(|t| self.entries.contains_key(&(family, profile, *t)))
            .collect()
    }

    /// Targets reachable from any source of a family.
    pub fn family_targets(&self, family: FormatFamily) -> Vec<TargetFormat> {
        TargetFormat::ALL
            .iter()
            .copied()
            .filter(|t| {
                self.entries
                    .keys()
                    .any(|(f, _, target)| *f == family && target == t)
            })
            .collect()
    }
}
