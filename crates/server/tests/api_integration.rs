//! API integration tests: upload, convert and download through the router.

mod common;

use axum::http::{header, StatusCode};
use serde_json::json;
use std::io::Read;

use common::{fixtures, TestFixture};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_exposes_engine_settings() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["engine"]["diagnostic_limit"], 300);
    assert_eq!(response.body["server"]["port"], 8080);
}

#[tokio::test]
async fn test_tools_reports_missing_ffmpeg() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/tools").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ffmpeg_installed"], false);

    let tools = response.body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 9);
    assert!(tools.iter().all(|t| t["available"] == false));
    assert!(tools.iter().any(|t| t["label"] == "LibreOffice"));
}

#[tokio::test]
async fn test_formats_lists_targets_per_family() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/formats").await;
    assert_eq!(response.status, StatusCode::OK);

    let image = response.body["families"]["image"].as_array().unwrap();
    assert!(image.contains(&json!("jpg")));
    assert!(image.contains(&json!("heic")));
    let archive = response.body["families"]["archive"].as_array().unwrap();
    assert!(archive.contains(&json!("tar.gz")));
}

#[tokio::test]
async fn test_upload_sanitizes_name_and_lists_targets() {
    let fixture = TestFixture::new();
    let response = fixture
        .upload("../My Photo.png", &fixtures::png_bytes(8, 8))
        .await;

    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["filename"], "My_Photo.png");
    assert_eq!(response.body["family"], "image");
    assert!(response.body["targets"]
        .as_array()
        .unwrap()
        .contains(&json!("webp")));
    assert!(fixture.temp_dir.path().join("uploads/My_Photo.png").is_file());
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let fixture = TestFixture::new();
    let response = fixture.upload("payload.exe", b"MZ").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "unsupported source format '.exe'");
}

#[tokio::test]
async fn test_convert_and_download() {
    let fixture = TestFixture::new();
    fixture
        .upload("logo.png", &fixtures::png_bytes(12, 10))
        .await;

    let response = fixture
        .post(
            "/api/v1/convert",
            json!({"file_path": "logo.png", "target_format": "JPEG", "quality": "standard"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["filename"], "logo.jpg");

    let download = fixture.get("/api/v1/download/logo.jpg").await;
    assert_eq!(download.status, StatusCode::OK);
    let disposition = download.headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"logo.jpg\""));
    let img = image::load_from_memory(&download.bytes).unwrap();
    assert_eq!((img.width(), img.height()), (12, 10));

    // No workspace survives the request.
    let leftovers = std::fs::read_dir(fixture.work_dir())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_failed_conversion_returns_summary() {
    let fixture = TestFixture::new();
    fixtures::write_docx(
        &fixture.temp_dir.path().join("report.docx"),
        &[("", "Body")],
        &[],
    );
    let docx = std::fs::read(fixture.temp_dir.path().join("report.docx")).unwrap();
    fixture.upload("report.docx", &docx).await;

    let response = fixture
        .post(
            "/api/v1/convert",
            json!({"file_path": "report.docx", "target_format": "pdf"}),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["success"], false);
    assert_eq!(
        response.body["error"],
        "PDF conversion requires one of: LibreOffice, Microsoft Word"
    );
}

#[tokio::test]
async fn test_convert_rejects_unknown_target() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/convert",
            json!({"file_path": "logo.png", "target_format": "exe"}),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "unknown target format 'exe'");
}

#[tokio::test]
async fn test_convert_missing_upload() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/convert",
            json!({"file_path": "never-uploaded.png", "target_format": "jpg"}),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("input file not found"));
}

#[tokio::test]
async fn test_download_missing_file() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/download/nothing.pdf").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_all_bundles_files() {
    let fixture = TestFixture::new();
    fixture.upload("a.png", &fixtures::png_bytes(4, 4)).await;
    for target in ["bmp", "gif"] {
        let response = fixture
            .post(
                "/api/v1/convert",
                json!({"file_path": "a.png", "target_format": target}),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    }

    let response = fixture
        .post("/api/v1/download-all", json!({"filenames": ["a.bmp", "a.gif"]}))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(response.bytes)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(names, vec!["a.bmp", "a.gif"]);

    let mut bmp = Vec::new();
    archive.by_name("a.bmp").unwrap().read_to_end(&mut bmp).unwrap();
    assert!(bmp.starts_with(b"BM"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.bytes).unwrap();
    assert!(text.contains("omniconv_http_requests_total"));
    assert!(text.contains("omniconv_worker_pool_active"));
}
