//! Office suites: LibreOffice headless and Microsoft Office automation.

use async_trait::async_trait;
use std::path::Path;

use super::{
    adopt_output, require_source, require_tools, AttemptContext, Backend, BackendDescriptor,
};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::{ConcurrencyHost, TimeoutTier, Tool};

const LIBREOFFICE_SOURCES: &[&str] = &[
    "doc", "docx", "odt", "rtf", "pptx", "ppt", "odp", "xls", "xlsx", "ods", "csv",
];

/// `soffice --headless --convert-to <fmt> --outdir <attempt dir> <input>`
pub struct LibreOfficeBackend {
    descriptor: BackendDescriptor,
}

impl LibreOfficeBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::subprocess(
                "libreoffice",
                "LibreOffice",
                Tool::LibreOffice,
            ),
        }
    }
}

impl Default for LibreOfficeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `--convert-to` filter argument and the extension LibreOffice writes.
fn convert_to(target: TargetFormat) -> Result<(&'static str, &'static str), ConversionError> {
    match target {
        TargetFormat::Pdf => Ok(("pdf", "pdf")),
        TargetFormat::Txt => Ok(("txt:Text", "txt")),
        TargetFormat::Html => Ok(("html", "html")),
        TargetFormat::Xlsx => Ok(("xlsx", "xlsx")),
        TargetFormat::Csv => Ok(("csv", "csv")),
        TargetFormat::Docx => Ok(("docx", "docx")),
        TargetFormat::Rtf => Ok(("rtf", "rtf")),
        other => Err(ConversionError::incompatible(format!(
            "LibreOffice cannot export {}",
            other
        ))),
    }
}

/// `file://` URL for a private user profile, so concurrent runs never share one.
fn profile_url(dir: &Path) -> String {
    let path = dir.join("lo-profile").to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

#[async_trait]
impl Backend for LibreOfficeBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, LIBREOFFICE_SOURCES)?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let (filter, ext) = convert_to(ctx.target)?;
        let program = ctx.tool(Tool::LibreOffice)?;

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .arg(format!("-env:UserInstallation={}", profile_url(&ctx.attempt_dir)))
            .args(["--headless", "--convert-to", filter, "--outdir"])
            .arg(&ctx.attempt_dir)
            .arg(&ctx.input);
        ctx.run_tool("LibreOffice", spec).await?;

        // LibreOffice names the output after the input file.
        let input_stem = ctx
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let produced = ctx.attempt_dir.join(format!("{}.{}", input_stem, ext));
        let output = ctx.output_path();
        adopt_output(&produced, &output).await?;

        Ok(BackendOutput::single(output))
    }
}

/// Microsoft Office application driven over COM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeApp {
    Word,
    PowerPoint,
}

impl OfficeApp {
    fn id(&self) -> &'static str {
        match self {
            Self::Word => "word-automation",
            Self::PowerPoint => "powerpoint-automation",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Word => "Microsoft Word",
            Self::PowerPoint => "Microsoft PowerPoint",
        }
    }

    fn sources(&self) -> &'static [&'static str] {
        match self {
            Self::Word => &["doc", "docx", "odt", "rtf"],
            Self::PowerPoint => &["ppt", "pptx", "odp"],
        }
    }

    /// PowerShell script exporting `input` to PDF at `output`.
    fn pdf_script(&self, input: &Path, output: &Path) -> String {
        let input = ps_quote(input);
        let output = ps_quote(output);
        match self {
            // wdFormatPDF = 17
            Self::Word => format!(
                "$ErrorActionPreference = 'Stop'\n\
                 $app = New-Object -ComObject Word.Application\n\
                 $app.Visible = $false\n\
                 $app.DisplayAlerts = 0\n\
                 try {{\n\
                 \x20   $doc = $app.Documents.Open({input}, $false, $true)\n\
                 \x20   $doc.SaveAs([ref]{output}, [ref]17)\n\
                 \x20   $doc.Close([ref]0)\n\
                 }} finally {{\n\
                 \x20   $app.Quit()\n\
                 }}\n"
            ),
            // ppSaveAsPDF = 32
            Self::PowerPoint => format!(
                "$ErrorActionPreference = 'Stop'\n\
                 $app = New-Object -ComObject PowerPoint.Application\n\
                 try {{\n\
                 \x20   $pres = $app.Presentations.Open({input}, $true, $false, $false)\n\
                 \x20   $pres.SaveAs({output}, 32)\n\
                 \x20   $pres.Close()\n\
                 }} finally {{\n\
                 \x20   $app.Quit()\n\
                 }}\n"
            ),
        }
    }
}

/// Single-quoted PowerShell string literal.
fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}

/// Exports to PDF through Word or PowerPoint (Windows only).
pub struct OfficeAutomationBackend {
    app: OfficeApp,
    descriptor: BackendDescriptor,
}

impl OfficeAutomationBackend {
    pub fn new(app: OfficeApp) -> Self {
        Self {
            app,
            descriptor: BackendDescriptor::subprocess(app.id(), app.label(), Tool::PowerShell),
        }
    }
}

#[async_trait]
impl Backend for OfficeAutomationBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        if !cfg!(windows) {
            return Err(ConversionError::PlatformUnsupported {
                backend: self.descriptor.label,
                platform: "Windows",
            });
        }
        require_source(&self.descriptor, source, self.app.sources())?;
        require_tools(&self.descriptor, host)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        if ctx.target != TargetFormat::Pdf {
            return Err(ConversionError::incompatible(format!(
                "{} automation only exports PDF",
                self.app.label()
            )));
        }
        let program = ctx.tool(Tool::PowerShell)?;

        // COM wants absolute paths.
        let input = std::path::absolute(&ctx.input)?;
        let output = std::path::absolute(ctx.output_path())?;

        let script = ctx.attempt_dir.join("export.ps1");
        tokio::fs::write(&script, self.app.pdf_script(&input, &output)).await?;

        let spec = ctx
            .process(program, TimeoutTier::Document)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
            ])
            .arg(&script);
        ctx.run_tool(self.app.label(), spec).await?;

        Ok(BackendOutput::single(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SourceFormat;
    use crate::host::{ToolLocator, WorkerPool};
    use std::time::Duration;

    fn isolated_host() -> ConcurrencyHost {
        ConcurrencyHost::with_parts(
            WorkerPool::new(1),
            ToolLocator::isolated(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_convert_to_filters() {
        assert_eq!(convert_to(TargetFormat::Txt).unwrap(), ("txt:Text", "txt"));
        assert_eq!(convert_to(TargetFormat::Pdf).unwrap(), ("pdf", "pdf"));
        assert!(convert_to(TargetFormat::Md).is_err());
    }

    #[test]
    fn test_profile_url() {
        let url = profile_url(Path::new("/tmp/ws/01-libreoffice"));
        assert_eq!(url, "file:///tmp/ws/01-libreoffice/lo-profile");
    }

    #[test]
    fn test_missing_soffice_is_precondition() {
        let backend = LibreOfficeBackend::new();
        let source = SourceFormat::classify(Path::new("report.docx")).unwrap();
        let err = backend.check(&source, &isolated_host()).unwrap_err();
        assert!(matches!(err, ConversionError::ToolUnavailable { .. }));
        assert_eq!(err.to_string(), "LibreOffice is not installed");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_automation_requires_windows() {
        let backend = OfficeAutomationBackend::new(OfficeApp::Word);
        let source = SourceFormat::classify(Path::new("report.docx")).unwrap();
        let err = backend.check(&source, &isolated_host()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Microsoft Word is only available on Windows"
        );
    }

    #[test]
    fn test_script_quotes_paths() {
        let script = OfficeApp::PowerPoint.pdf_script(
            Path::new("C:/in/it's.pptx"),
            Path::new("C:/out/deck.pdf"),
        );
        assert!(script.contains("'C:/in/it''s.pptx'"));
        assert!(script.contains("SaveAs('C:/out/deck.pdf', 32)"));
    }
}
