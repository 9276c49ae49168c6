//! Error types for the conversion engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::format::FormatFamily;
use crate::host::{HostError, ProcessError};

/// How the fallback executor reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The request itself cannot be routed; no backend runs.
    Classification,
    /// A backend cannot run here (tool missing, platform, source extension).
    PreconditionUnmet,
    /// The backend ran but produced nothing usable.
    Execution,
    /// The input is corrupt or structurally incompatible with the target.
    FatalInput,
    /// The backend exceeded its time allotment.
    Timeout,
}

impl FailureClass {
    /// Whether the executor advances to the next candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PreconditionUnmet | Self::Execution | Self::Timeout
        )
    }
}

/// Errors that can occur while converting a file.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Unknown source extension.
    #[error("unsupported source format '.{extension}'")]
    UnsupportedSource { extension: String },

    /// No strategy exists for the requested target.
    #[error("unsupported target format '{target}' for {family} sources")]
    UnsupportedTarget {
        target: String,
        family: FormatFamily,
    },

    /// Input file does not exist or is not a regular file.
    #[error("input file not found: {}", .path.display())]
    InputNotFound { path: PathBuf },

    /// Input file has no content.
    #[error("input file is empty: {}", .path.display())]
    EmptyInput { path: PathBuf },

    /// A required external tool could not be located.
    #[error("{tool} is not installed")]
    ToolUnavailable { tool: String },

    /// The backend does not handle this source extension.
    #[error("{backend} does not accept .{extension} sources")]
    SourceNotAccepted {
        backend: &'static str,
        extension: String,
    },

    /// The backend only runs on another platform.
    #[error("{backend} is only available on {platform}")]
    PlatformUnsupported {
        backend: &'static str,
        platform: &'static str,
    },

    /// The backend ran but failed.
    #[error("{reason}{}", .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
    ExecutionFailed {
        reason: String,
        detail: Option<String>,
    },

    /// The backend reported success but left no usable file.
    #[error("{backend} produced no output")]
    EmptyOutput { backend: String },

    /// A subprocess exceeded its timeout.
    #[error("timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The input could not be parsed.
    #[error("corrupt input: {reason}")]
    CorruptInput { reason: String },

    /// The input cannot be represented in the target format.
    #[error("{reason}")]
    Incompatible { reason: String },

    /// I/O error during an attempt.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal fault, including a caught panic.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Self::ToolUnavailable { tool: tool.into() }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
            detail: None,
        }
    }

    /// Execution failure with tool output attached.
    pub fn execution_with_detail(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = detail.trim();
        Self::ExecutionFailed {
            reason: reason.into(),
            detail: (!detail.is_empty()).then(|| detail.to_string()),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptInput {
            reason: reason.into(),
        }
    }

    pub fn incompatible(reason: impl Into<String>) -> Self {
        Self::Incompatible {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::UnsupportedSource { .. }
            | Self::UnsupportedTarget { .. }
            | Self::InputNotFound { .. }
            | Self::EmptyInput { .. } => FailureClass::Classification,
            Self::ToolUnavailable { .. }
            | Self::SourceNotAccepted { .. }
            | Self::PlatformUnsupported { .. } => FailureClass::PreconditionUnmet,
            Self::ExecutionFailed { .. }
            | Self::EmptyOutput { .. }
            | Self::Io(_)
            | Self::Internal(_) => FailureClass::Execution,
            Self::Timeout { .. } => FailureClass::Timeout,
            Self::CorruptInput { .. } | Self::Incompatible { .. } => FailureClass::FatalInput,
        }
    }

    /// Display text cut to at most `limit` characters.
    pub fn diagnostic(&self, limit: usize) -> String {
        truncate_diagnostic(&self.to_string(), limit)
    }
}

impl From<ProcessError> for ConversionError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound { program } => Self::ToolUnavailable {
                tool: program.display().to_string(),
            },
            ProcessError::Timeout { timeout_secs, .. } => Self::Timeout { timeout_secs },
            ProcessError::Spawn { program, source } => Self::ExecutionFailed {
                reason: format!("failed to start {}", program.display()),
                detail: Some(source.to_string()),
            },
            ProcessError::Io(e) => Self::Io(e),
        }
    }
}

impl From<HostError> for ConversionError {
    fn from(err: HostError) -> Self {
        Self::execution(err.to_string())
    }
}

/// Cuts `text` to `limit` characters on a char boundary, marking the cut.
pub fn truncate_diagnostic(text: &str, limit: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(
            ConversionError::tool_unavailable("LibreOffice").class(),
            FailureClass::PreconditionUnmet
        );
        assert_eq!(
            ConversionError::corrupt("bad header").class(),
            FailureClass::FatalInput
        );
        assert_eq!(
            ConversionError::Timeout { timeout_secs: 5 }.class(),
            FailureClass::Timeout
        );
        assert!(FailureClass::Timeout.is_recoverable());
        assert!(FailureClass::Execution.is_recoverable());
        assert!(!FailureClass::FatalInput.is_recoverable());
        assert!(!FailureClass::Classification.is_recoverable());
    }

    #[test]
    fn test_execution_detail_display() {
        let err = ConversionError::execution_with_detail("ffmpeg exited with 1", "  bad codec\n");
        assert_eq!(err.to_string(), "ffmpeg exited with 1: bad codec");

        let err = ConversionError::execution_with_detail("ffmpeg exited with 1", "   ");
        assert_eq!(err.to_string(), "ffmpeg exited with 1");
    }

    #[test]
    fn test_truncate_diagnostic() {
        assert_eq!(truncate_diagnostic("short", 300), "short");
        assert_eq!(truncate_diagnostic("abcdef", 3), "abc...");
        // Multi-byte characters are not split.
        assert_eq!(truncate_diagnostic("ğğğğ", 2), "ğğ...");
    }

    #[test]
    fn test_process_timeout_maps_to_timeout() {
        let err: ConversionError = ProcessError::Timeout {
            program: PathBuf::from("ffmpeg"),
            timeout_secs: 600,
        }
        .into();
        assert_eq!(err.to_string(), "timed out after 600s");
        assert_eq!(err.class(), FailureClass::Timeout);
    }
}
