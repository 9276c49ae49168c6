//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the router around a
//! dispatcher whose host finds no external tools, so only the native
//! backends can run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use omniconv_core::{
    host::{ConcurrencyHost, ToolLocator, WorkerPool},
    Config, Dispatcher, StrategyTable,
};
use omniconv_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use omniconv_core::testing::fixtures;

const BOUNDARY: &str = "omniconv-test-boundary";

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new();
///     let response = fixture.upload("photo.png", &fixtures::png_bytes(4, 4)).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Temporary directory holding uploads, outputs and workspaces
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    /// Body parsed as JSON, or `Null` when it is not JSON.
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.engine.upload_dir = temp_dir.path().join("uploads");
        config.engine.output_dir = temp_dir.path().join("converted");
        config.engine.workspace_root = temp_dir.path().join("work");

        let host = ConcurrencyHost::with_parts(
            WorkerPool::new(2),
            ToolLocator::isolated(),
            Duration::from_secs(30),
            Duration::from_secs(30),
        );
        let dispatcher = Dispatcher::with_parts(
            StrategyTable::standard(),
            host,
            config.engine.workspace_root.clone(),
            config.engine.diagnostic_limit,
        );

        let state = Arc::new(AppState::with_dispatcher(config, dispatcher));
        let router = create_router(state);

        Self { router, temp_dir }
    }

    #[allow(dead_code)]
    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("converted")
    }

    #[allow(dead_code)]
    pub fn work_dir(&self) -> PathBuf {
        self.temp_dir.path().join("work")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a POST request with JSON body.
    #[allow(dead_code)]
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Upload a file as the multipart `file` field.
    #[allow(dead_code)]
    pub async fn upload(&self, filename: &str, content: &[u8]) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/upload")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}
