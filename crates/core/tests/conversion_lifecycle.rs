//! Conversion lifecycle integration tests.
//!
//! These run the dispatcher end to end against the standard strategy table
//! (native backends only, no host tools) and against scripted backends:
//! - Native image, archive, spreadsheet and document conversions
//! - Workspace cleanup after success, failure and panic
//! - Fallback attribution and summary-only error messages
//! - Deterministic output names and timeouts

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use omniconv_core::{
    backend::{Backend, NativeImageBackend},
    engine::{ConversionRequest, Dispatcher, Quality},
    format::{FormatFamily, SourceProfile, TargetFormat},
    host::{ConcurrencyHost, Tool, ToolLocator, WorkerPool},
    testing::{fixtures, MockBackend},
    StrategyTable,
};

/// Dispatcher plus the directories it works in.
struct TestHarness {
    dispatcher: Dispatcher,
    input_dir: TempDir,
    output_dir: TempDir,
    work_dir: TempDir,
}

impl TestHarness {
    /// Standard strategy table on a host where no external tool is found.
    fn standard() -> Self {
        Self::with_table(StrategyTable::standard(), ToolLocator::isolated(), 120)
    }

    fn with_table(table: StrategyTable, locator: ToolLocator, timeout_secs: u64) -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let host = ConcurrencyHost::with_parts(
            WorkerPool::new(2),
            locator,
            Duration::from_secs(timeout_secs),
            Duration::from_secs(timeout_secs),
        );
        let dispatcher = Dispatcher::with_parts(table, host, work_dir.path(), 300);
        Self {
            dispatcher,
            input_dir: TempDir::new().expect("Failed to create input dir"),
            output_dir: TempDir::new().expect("Failed to create output dir"),
            work_dir,
        }
    }

    /// Table routing document sources to the given mocks, in order.
    fn with_document_backends(targets: &[TargetFormat], mocks: &[&Arc<MockBackend>]) -> Self {
        let mut table = StrategyTable::empty();
        table.insert(
            FormatFamily::Document,
            SourceProfile::Standard,
            targets,
            &candidates(mocks),
        );
        Self::with_table(table, ToolLocator::isolated(), 120)
    }

    fn input(&self, name: &str) -> PathBuf {
        self.input_dir.path().join(name)
    }

    fn request(&self, name: &str, target: TargetFormat) -> ConversionRequest {
        ConversionRequest::new(self.input(name), self.output_dir.path(), target)
    }

    fn output(&self, name: &str) -> PathBuf {
        self.output_dir.path().join(name)
    }

    fn workspace_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir.path())
            .map(|entries| entries.count() == 0)
            .unwrap_or(true)
    }
}

fn arc(backend: MockBackend) -> Arc<MockBackend> {
    Arc::new(backend)
}

fn candidates(mocks: &[&Arc<MockBackend>]) -> Vec<Arc<dyn Backend>> {
    mocks
        .iter()
        .map(|mock| {
            let backend: Arc<MockBackend> = Arc::clone(*mock);
            backend as Arc<dyn Backend>
        })
        .collect()
}

// =============================================================================
// Native conversions
// =============================================================================

#[tokio::test]
async fn test_png_to_jpg_natively() {
    let harness = TestHarness::standard();
    fixtures::write_png(&harness.input("holiday photo.png"), 40, 30);

    let outcome = harness
        .dispatcher
        .convert(harness.request("holiday photo.png", TargetFormat::Jpg).with_quality(Quality::Standard))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.filename.as_deref(), Some("holiday_photo.jpg"));
    let img = image::open(harness.output("holiday_photo.jpg")).unwrap();
    assert_eq!((img.width(), img.height()), (40, 30));
    assert!(harness.workspace_is_empty());
}

#[tokio::test]
async fn test_zip_to_tar_gz_natively() {
    let harness = TestHarness::standard();
    fixtures::write_zip(
        &harness.input("bundle.zip"),
        &[
            ("readme.txt", b"hello".as_slice()),
            ("docs/guide.md", b"# Guide".as_slice()),
        ],
    );

    let outcome = harness
        .dispatcher
        .convert(harness.request("bundle.zip", TargetFormat::TarGz))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.filename.as_deref(), Some("bundle.tar.gz"));

    let file = std::fs::File::open(harness.output("bundle.tar.gz")).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut entries: Vec<(String, String)> = archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            (path, body)
        })
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("docs/guide.md".to_string(), "# Guide".to_string()),
            ("readme.txt".to_string(), "hello".to_string()),
        ]
    );
    assert!(harness.workspace_is_empty());
}

#[tokio::test]
async fn test_csv_to_json_natively() {
    let harness = TestHarness::standard();
    fixtures::write_csv(
        &harness.input("sales.csv"),
        &[
            vec!["region".to_string(), "units".to_string()],
            vec!["north".to_string(), "12".to_string()],
            vec!["south".to_string(), String::new()],
        ],
    );

    let outcome = harness
        .dispatcher
        .convert(harness.request("sales.csv", TargetFormat::Json))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(harness.output("sales.json")).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"region": "north", "units": 12},
            {"region": "south", "units": null}
        ])
    );
}

#[tokio::test]
async fn test_docx_to_markdown_natively() {
    let harness = TestHarness::standard();
    fixtures::write_docx(
        &harness.input("report.docx"),
        &[("Heading1", "Results"), ("", "Revenue grew.")],
        &[&["Quarter", "Revenue"], &["Q1", "100"]],
    );

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Md))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.filename.as_deref(), Some("report.md"));
    let md = std::fs::read_to_string(harness.output("report.md")).unwrap();
    assert!(md.contains("# Results"));
    assert!(md.contains("Revenue grew."));
    assert!(md.contains("| Quarter | Revenue |"));
}

// =============================================================================
// Cleanup
// =============================================================================

#[tokio::test]
async fn test_workspace_removed_after_failure() {
    let flaky = arc(MockBackend::failing("flaky", "Flaky", "exit status 1"));
    let harness = TestHarness::with_document_backends(&[TargetFormat::Pdf], &[&flaky]);
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    assert!(!outcome.success);
    assert_eq!(flaky.calls(), 1);
    assert!(!flaky.attempt_dirs()[0].exists());
    assert!(harness.workspace_is_empty());
}

#[tokio::test]
async fn test_backend_panic_becomes_failed_outcome() {
    let boom = arc(MockBackend::panicking("boom", "Boom", "renderer exploded"));
    let harness = TestHarness::with_document_backends(&[TargetFormat::Pdf], &[&boom]);
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("internal error: renderer exploded"));
    assert!(harness.workspace_is_empty());
    assert!(harness.input("report.docx").exists());
}

// =============================================================================
// Fallback and error reporting
// =============================================================================

#[tokio::test]
async fn test_image_the_library_cannot_read_falls_through() {
    let magick = arc(MockBackend::writing("imagemagick", "ImageMagick", "jpeg from magick"));
    let native: Arc<dyn Backend> = Arc::new(NativeImageBackend::new());
    let mut routes = vec![native];
    routes.extend(candidates(&[&magick]));
    let mut table = StrategyTable::empty();
    table.insert(
        FormatFamily::Image,
        SourceProfile::Standard,
        &[TargetFormat::Jpg],
        &routes,
    );
    let harness = TestHarness::with_table(table, ToolLocator::isolated(), 120);
    // OpenEXR signature behind a .png name.
    std::fs::write(
        harness.input("scan.png"),
        [0x76u8, 0x2f, 0x31, 0x01, 0x02, 0x00, 0x00, 0x00],
    )
    .unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("scan.png", TargetFormat::Jpg))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(magick.calls(), 1);
    assert_eq!(
        std::fs::read_to_string(harness.output("scan.jpg")).unwrap(),
        "jpeg from magick"
    );
}

#[tokio::test]
async fn test_fallback_success_is_attributed_to_the_backend_that_ran() {
    let first = arc(MockBackend::failing("first", "First", "no output"));
    let second = arc(MockBackend::writing("second", "Second", "%PDF-1.5"));
    let third = arc(MockBackend::writing("third", "Third", "%PDF-1.5 third"));
    let harness = TestHarness::with_document_backends(
        &[TargetFormat::Pdf],
        &[&first, &second, &third],
    );
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    assert!(outcome.success);
    assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
    assert_eq!(
        std::fs::read_to_string(harness.output("report.pdf")).unwrap(),
        "%PDF-1.5"
    );
}

#[tokio::test]
async fn test_error_reports_only_the_terminal_summary() {
    let first = arc(MockBackend::failing("first", "First", "first broke"));
    let second = arc(MockBackend::failing("second", "Second", "second broke"));
    let harness =
        TestHarness::with_document_backends(&[TargetFormat::Pdf], &[&first, &second]);
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    let error = outcome.error.unwrap();
    assert_eq!(error, "PDF conversion failed: second broke");
    assert!(!error.contains("first broke"));
}

#[tokio::test]
async fn test_unknown_extension_runs_no_backend() {
    let mock = arc(MockBackend::writing("any", "Any", "data"));
    let harness = TestHarness::with_document_backends(&[TargetFormat::Pdf], &[&mock]);
    std::fs::write(harness.input("mystery.xyz"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("mystery.xyz", TargetFormat::Pdf))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("unsupported source format '.xyz'"));
    assert_eq!(mock.calls(), 0);
    assert!(harness.workspace_is_empty());
}

#[tokio::test]
async fn test_unrouted_target_runs_no_backend() {
    let mock = arc(MockBackend::writing("any", "Any", "data"));
    let harness = TestHarness::with_document_backends(&[TargetFormat::Pdf], &[&mock]);
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Mp3))
        .await;

    assert!(!outcome.success);
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_missing_input_is_reported() {
    let harness = TestHarness::standard();

    let outcome = harness
        .dispatcher
        .convert(harness.request("absent.png", TargetFormat::Jpg))
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().starts_with("input file not found"));
}

// =============================================================================
// Names and timeouts
// =============================================================================

#[tokio::test]
async fn test_rerun_overwrites_with_the_same_name() {
    let harness = TestHarness::standard();
    fixtures::write_png(&harness.input("logo.png"), 16, 16);

    let first = harness
        .dispatcher
        .convert(harness.request("logo.png", TargetFormat::Bmp))
        .await;
    let second = harness
        .dispatcher
        .convert(harness.request("logo.png", TargetFormat::Bmp))
        .await;

    assert!(first.success && second.success);
    assert_eq!(first.filename, second.filename);
    let names: Vec<_> = std::fs::read_dir(harness.output_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_is_reported_without_hanging() {
    let pid_dir = TempDir::new().unwrap();
    let pid_file = pid_dir.path().join("sleeper.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
    let sleeper = arc(MockBackend::running("sleeper", "Sleeper", "sh", &["-c", &script]));
    let mut table = StrategyTable::empty();
    table.insert(
        FormatFamily::Document,
        SourceProfile::Standard,
        &[TargetFormat::Pdf],
        &candidates(&[&sleeper]),
    );
    let harness = TestHarness::with_table(table, ToolLocator::isolated(), 1);
    std::fs::write(harness.input("report.docx"), "stub").unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_secs(20),
        harness
            .dispatcher
            .convert(harness.request("report.docx", TargetFormat::Pdf)),
    )
    .await
    .expect("conversion hung past its timeout");

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("PDF conversion failed: timed out after 1s")
    );
    assert!(harness.workspace_is_empty());

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(process_has_exited(pid).await, "subprocess {} left running", pid);
}

/// Polls until `pid` is gone or a zombie.
#[cfg(unix)]
async fn process_has_exited(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    for _ in 0..40 {
        if let Err(Errno::ESRCH) = kill(Pid::from_raw(pid), None) {
            return true;
        }
        let zombie = std::fs::read_to_string(format!("/proc/{}/status", pid))
            .map(|status| {
                status
                    .lines()
                    .any(|line| line.starts_with("State:") && line.contains('Z'))
            })
            .unwrap_or(false);
        if zombie {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

// =============================================================================
// report.docx -> pdf
// =============================================================================

#[tokio::test]
async fn test_docx_to_pdf_without_office_tools() {
    let harness = TestHarness::standard();
    fixtures::write_docx(&harness.input("report.docx"), &[("", "Body")], &[]);

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("PDF conversion requires one of: LibreOffice, Microsoft Word")
    );
    assert!(harness.workspace_is_empty());
}

/// Writes an executable that mimics `soffice --convert-to pdf --outdir <dir> <input>`.
#[cfg(unix)]
fn fake_soffice(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("soffice");
    std::fs::write(
        &script,
        r#"#!/bin/sh
outdir=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--outdir" ]; then outdir="$arg"; fi
  prev="$arg"
  input="$arg"
done
name=$(basename "$input")
printf '%%PDF-1.5 fake' > "$outdir/${name%.*}.pdf"
"#,
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[tokio::test]
async fn test_docx_to_pdf_with_libreoffice_present() {
    let tools = TempDir::new().unwrap();
    let soffice = fake_soffice(tools.path());
    let harness = TestHarness::with_table(
        StrategyTable::standard(),
        ToolLocator::isolated().with_override(Tool::LibreOffice, soffice),
        30,
    );
    fixtures::write_docx(&harness.input("report.docx"), &[("", "Body")], &[]);

    let outcome = harness
        .dispatcher
        .convert(harness.request("report.docx", TargetFormat::Pdf))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.filename.as_deref(), Some("report.pdf"));
    assert_eq!(
        std::fs::read_to_string(harness.output("report.pdf")).unwrap(),
        "%PDF-1.5 fake"
    );
    assert!(harness.workspace_is_empty());
}
