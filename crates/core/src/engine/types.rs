use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::format::TargetFormat;

/// Output quality preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    High,
    Standard,
}

/// A request to convert one file.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Source file. Never modified or deleted.
    pub input: PathBuf,
    /// Where outputs are placed.
    pub output_dir: PathBuf,
    pub target: TargetFormat,
    pub quality: Quality,
}

impl ConversionRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        target: TargetFormat,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            target,
            quality: Quality::default(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }
}

/// The normalized result of a conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Every produced file name in page/slide order (multi-output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionOutcome {
    /// Successful outcome for files already placed in the output directory.
    pub fn succeeded(files: &[PathBuf], note: Option<String>) -> Self {
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        Self {
            success: true,
            output_path: files.first().cloned(),
            filename: names.first().cloned(),
            all_files: (names.len() > 1).then_some(names),
            note,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            filename: None,
            all_files: None,
            note: None,
            error: Some(error.into()),
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// The executor moves on to the next candidate.
    Recoverable,
    /// The executor stops.
    Fatal,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Recoverable => "recoverable",
            Self::Fatal => "fatal",
        }
    }
}

/// Record of one backend attempt, kept only for the duration of a request.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub backend: &'static str,
    pub outcome: AttemptOutcome,
    pub message: String,
    /// True when the backend never ran because a precondition was unmet.
    pub precondition_unmet: bool,
    pub elapsed: Duration,
}

/// Files a backend wrote into its attempt directory.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    /// Output files in page/slide order.
    pub files: Vec<PathBuf>,
    pub note: Option<String>,
}

impl BackendOutput {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            files: vec![path.into()],
            note: None,
        }
    }

    pub fn many(files: Vec<PathBuf>) -> Self {
        Self { files, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn primary(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }
}
