//! Source format classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Coarse classification of a source file, used to select a strategy table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Image,
    AudioVideo,
    Document,
    Spreadsheet,
    Archive,
    Presentation,
}

impl FormatFamily {
    /// All families, in display order.
    pub const ALL: [FormatFamily; 6] = [
        FormatFamily::Image,
        FormatFamily::AudioVideo,
        FormatFamily::Document,
        FormatFamily::Spreadsheet,
        FormatFamily::Archive,
        FormatFamily::Presentation,
    ];

    /// Stable lowercase name (also used as a metrics label).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::AudioVideo => "audio_video",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Archive => "archive",
            Self::Presentation => "presentation",
        }
    }

    /// Classifies a lowercase extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let family = match ext {
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "ico" | "tiff" | "tif" | "svg"
            | "heic" | "heif" => Self::Image,
            "mp4" | "avi" | "mkv" | "mov" | "webm" | "flv" | "wmv" | "m4v" | "mp3" | "wav"
            | "flac" | "aac" | "ogg" | "m4a" | "opus" | "wma" => Self::AudioVideo,
            "pdf" | "docx" | "doc" | "odt" | "rtf" => Self::Document,
            "csv" | "xlsx" | "xls" | "ods" | "json" | "txt" => Self::Spreadsheet,
            "zip" | "7z" | "tar" | "gz" | "tgz" | "bz2" | "tar.gz" | "tar.bz2" => Self::Archive,
            "pptx" | "ppt" | "odp" => Self::Presentation,
            _ => return None,
        };
        Some(family)
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Image => "image",
            Self::AudioVideo => "audio/video",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Archive => "archive",
            Self::Presentation => "presentation",
        };
        f.write_str(label)
    }
}

/// Distinguishes sources that need a dedicated route within their family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceProfile {
    Standard,
    /// Vector images, rasterized by dedicated backends.
    Vector,
}

/// A classified source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFormat {
    pub family: FormatFamily,
    pub profile: SourceProfile,
    /// Lowercase extension without the leading dot; compound for `tar.gz`/`tar.bz2`.
    pub extension: String,
}

impl SourceFormat {
    /// Classifies a file by its name. Returns `None` for unknown extensions.
    pub fn classify(path: &Path) -> Option<Self> {
        let extension = source_extension(path)?;
        let family = FormatFamily::from_extension(&extension)?;
        let profile = if extension == "svg" {
            SourceProfile::Vector
        } else {
            SourceProfile::Standard
        };
        Some(Self {
            family,
            profile,
            extension,
        })
    }

    /// Whether the extension is one of `exts`.
    pub fn is_one_of(&self, exts: &[&str]) -> bool {
        exts.contains(&self.extension.as_str())
    }
}

/// Lowercase extension of a file name, recognizing `.tar.gz` and `.tar.bz2`.
pub fn source_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    for compound in ["tar.gz", "tar.bz2"] {
        if name.len() > compound.len() + 1 && name.ends_with(&format!(".{}", compound)) {
            return Some(compound.to_string());
        }
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// File name without its (possibly compound) extension.
pub fn source_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match source_extension(path) {
        Some(ext) if name.len() > ext.len() + 1 => name[..name.len() - ext.len() - 1].to_string(),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_case_insensitive() {
        let source = SourceFormat::classify(Path::new("/tmp/Holiday.JPG")).unwrap();
        assert_eq!(source.family, FormatFamily::Image);
        assert_eq!(source.extension, "jpg");
        assert_eq!(source.profile, SourceProfile::Standard);
    }

    #[test]
    fn test_classify_svg_is_vector() {
        let source = SourceFormat::classify(Path::new("logo.svg")).unwrap();
        assert_eq!(source.family, FormatFamily::Image);
        assert_eq!(source.profile, SourceProfile::Vector);
    }

    #[test]
    fn test_classify_compound_archive() {
        let source = SourceFormat::classify(Path::new("backup.tar.gz")).unwrap();
        assert_eq!(source.family, FormatFamily::Archive);
        assert_eq!(source.extension, "tar.gz");
        assert_eq!(source_stem(Path::new("backup.tar.gz")), "backup");
    }

    #[test]
    fn test_classify_unknown_extension() {
        assert!(SourceFormat::classify(Path::new("data.xyz")).is_none());
        assert!(SourceFormat::classify(Path::new("README")).is_none());
    }

    #[test]
    fn test_classify_families() {
        let family = |name: &str| SourceFormat::classify(Path::new(name)).unwrap().family;
        assert_eq!(family("song.flac"), FormatFamily::AudioVideo);
        assert_eq!(family("report.docx"), FormatFamily::Document);
        assert_eq!(family("sheet.xlsx"), FormatFamily::Spreadsheet);
        assert_eq!(family("deck.pptx"), FormatFamily::Presentation);
        assert_eq!(family("bundle.7z"), FormatFamily::Archive);
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(source_stem(Path::new("/a/b/report.docx")), "report");
        assert_eq!(source_stem(Path::new("archive.v2.zip")), "archive.v2");
    }
}
