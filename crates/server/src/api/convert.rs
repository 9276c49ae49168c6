//! Upload, conversion and download endpoints.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;

use omniconv_core::{
    clean_filename, format::source_extension, ConversionOutcome, ConversionRequest, FormatFamily,
    Quality, SourceFormat, TargetFormat,
};

use super::handlers::{api_error, ApiError};
use crate::metrics::{DOWNLOADS_TOTAL, UPLOADS_TOTAL};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub family: FormatFamily,
    pub targets: Vec<TargetFormat>,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// Name of a previously uploaded file.
    pub file_path: String,
    pub target_format: String,
    #[serde(default)]
    pub quality: Option<Quality>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadAllRequest {
    pub filenames: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Stores a multipart `file` field in the upload directory.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = clean_filename(field.file_name().unwrap_or_default());
        let bytes = field.bytes().await.map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
        })?;
        upload = Some((name, bytes.to_vec()));
    }

    let Some((filename, bytes)) = upload else {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'file' field"));
    };

    let Some(source) = SourceFormat::classify(std::path::Path::new(&filename)) else {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        let extension = source_extension(std::path::Path::new(&filename)).unwrap_or_default();
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("unsupported source format '.{}'", extension),
        ));
    };
    if bytes.is_empty() {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(api_error(StatusCode::BAD_REQUEST, "Uploaded file is empty"));
    }

    let path = state.upload_path(&filename).map_err(internal)?;
    tokio::fs::write(&path, &bytes).await.map_err(internal)?;
    UPLOADS_TOTAL.with_label_values(&["stored"]).inc();
    info!("Stored upload {:?} ({} bytes)", path, bytes.len());

    let targets = state
        .dispatcher()
        .strategy()
        .targets_for(source.family, source.profile);
    Ok(Json(UploadResponse {
        filename,
        family: source.family,
        targets,
        size_bytes: bytes.len() as u64,
    }))
}

/// Converts an uploaded file. Failed conversions answer 422 with the outcome.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConvertRequest>,
) -> Result<(StatusCode, Json<ConversionOutcome>), ApiError> {
    let target: TargetFormat = request
        .target_format
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("{}", e)))?;

    let input = state
        .upload_path(&clean_filename(&request.file_path))
        .map_err(internal)?;
    let output_dir = state.output_dir().map_err(internal)?;

    let outcome = state
        .dispatcher()
        .convert(
            ConversionRequest::new(input, output_dir, target)
                .with_quality(request.quality.unwrap_or_default()),
        )
        .await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(outcome)))
}

/// Serves one converted file as an attachment.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let name = clean_filename(&filename);
    let path = state.output_path(&name).map_err(internal)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("File not found: {}", name),
            ))
        }
        Err(e) => return Err(internal(e)),
    };
    DOWNLOADS_TOTAL.with_label_values(&["single"]).inc();
    Ok(attachment(&name, bytes))
}

/// Bundles the named converted files into one zip.
pub async fn download_all(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadAllRequest>,
) -> Result<Response, ApiError> {
    if request.filenames.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No files requested"));
    }

    let mut files: Vec<(String, PathBuf)> = Vec::with_capacity(request.filenames.len());
    for raw in &request.filenames {
        let name = clean_filename(raw);
        let path = state.output_path(&name).map_err(internal)?;
        if !path.is_file() {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("File not found: {}", name),
            ));
        }
        files.push((name, path));
    }

    let bytes = tokio::task::spawn_blocking(move || bundle(&files))
        .await
        .map_err(|e| internal(format!("bundle task failed: {}", e)))?
        .map_err(internal)?;

    DOWNLOADS_TOTAL.with_label_values(&["bundle"]).inc();
    let name = format!(
        "converted_files_{}.zip",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok(attachment(&name, bytes))
}

// ============================================================================
// Helpers
// ============================================================================

fn bundle(files: &[(String, PathBuf)]) -> std::io::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, path) in files {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&std::fs::read(path)?)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn attachment(name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                    name,
                    urlencoding::encode(name)
                ),
            ),
        ],
        Body::from(bytes),
    )
        .into_response()
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    warn!("Request failed: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
