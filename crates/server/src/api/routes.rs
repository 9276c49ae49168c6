use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{convert, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload = state.config().server.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Host capabilities
        .route("/tools", get(handlers::tools))
        .route("/formats", get(handlers::formats))
        // Files
        .route(
            "/upload",
            post(convert::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/convert", post(convert::convert))
        .route("/download/{filename}", get(convert::download))
        .route("/download-all", post(convert::download_all))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics).with_state(state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
