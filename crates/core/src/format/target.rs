//! Target format tokens.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    // Images
    Png,
    Jpg,
    Webp,
    Bmp,
    Gif,
    Ico,
    Tiff,
    Heic,
    // Audio
    Mp3,
    Wav,
    Aac,
    Ogg,
    Flac,
    M4a,
    Opus,
    // Video
    Mp4,
    Webm,
    Avi,
    Mkv,
    Mov,
    // Documents
    Pdf,
    Txt,
    Html,
    Md,
    Rtf,
    Docx,
    // Tabular
    Csv,
    Xlsx,
    Json,
    // Archives
    Zip,
    SevenZ,
    Tar,
    TarGz,
    Tgz,
    Gz,
}

impl TargetFormat {
    /// Every target format.
    pub const ALL: [TargetFormat; 35] = [
        Self::Png,
        Self::Jpg,
        Self::Webp,
        Self::Bmp,
        Self::Gif,
        Self::Ico,
        Self::Tiff,
        Self::Heic,
        Self::Mp3,
        Self::Wav,
        Self::Aac,
        Self::Ogg,
        Self::Flac,
        Self::M4a,
        Self::Opus,
        Self::Mp4,
        Self::Webm,
        Self::Avi,
        Self::Mkv,
        Self::Mov,
        Self::Pdf,
        Self::Txt,
        Self::Html,
        Self::Md,
        Self::Rtf,
        Self::Docx,
        Self::Csv,
        Self::Xlsx,
        Self::Json,
        Self::Zip,
        Self::SevenZ,
        Self::Tar,
        Self::TarGz,
        Self::Tgz,
        Self::Gz,
    ];

    /// Canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Ico => "ico",
            Self::Tiff => "tiff",
            Self::Heic => "heic",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Aac => "aac",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Html => "html",
            Self::Md => "md",
            Self::Rtf => "rtf",
            Self::Docx => "docx",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Json => "json",
            Self::Zip => "zip",
            Self::SevenZ => "7z",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::Tgz => "tgz",
            Self::Gz => "gz",
        }
    }

    /// Extension of the produced file. `gz` repacks as tar, so it yields `tar.gz`.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gz => "tar.gz",
            other => other.as_str(),
        }
    }

    /// Output file name for a stem.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }

    /// Whether the target is an audio-only format.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Mp3 | Self::Wav | Self::Aac | Self::Ogg | Self::Flac | Self::M4a | Self::Opus
        )
    }

    /// Whether the target is a gzip-compressed tar.
    pub fn is_gzipped_tar(&self) -> bool {
        matches!(self, Self::TarGz | Self::Tgz | Self::Gz)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown target token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target format '{0}'")]
pub struct UnknownTargetFormat(pub String);

impl FromStr for TargetFormat {
    type Err = UnknownTargetFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match token.as_str() {
            "jpeg" => Self::Jpg,
            "tif" => Self::Tiff,
            "markdown" => Self::Md,
            "htm" => Self::Html,
            other => *Self::ALL
                .iter()
                .find(|f| f.as_str() == other)
                .ok_or_else(|| UnknownTargetFormat(s.to_string()))?,
        };
        Ok(format)
    }
}

impl Serialize for TargetFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TargetFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}
