use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use omniconv_core::{Config, FormatFamily, TargetFormat, Tool, ToolStatus};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

#[derive(Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolStatus>,
    pub ffmpeg_installed: bool,
}

/// Availability of every external tool on this host.
pub async fn tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    let locator = state.dispatcher().host().locator();
    Json(ToolsResponse {
        tools: locator.status(),
        ffmpeg_installed: locator.is_available(Tool::Ffmpeg),
    })
}

#[derive(Serialize)]
pub struct FormatsResponse {
    pub families: BTreeMap<&'static str, Vec<TargetFormat>>,
}

/// Targets reachable from each source family.
pub async fn formats(State(state): State<Arc<AppState>>) -> Json<FormatsResponse> {
    let strategy = state.dispatcher().strategy();
    let families = FormatFamily::ALL
        .iter()
        .map(|family| (family.as_str(), strategy.family_targets(*family)))
        .collect();
    Json(FormatsResponse { families })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
