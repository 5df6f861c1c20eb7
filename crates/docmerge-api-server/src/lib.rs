//! REST API server for docmerge
//!
//! Exposes the merge service over HTTP:
//! - Template upload (multipart) with variable detection and OCR fallback
//! - Manual variable editing
//! - Entry submission (in-process store)
//! - Merge as a DOCX download or an HTML preview
//! - Direct OCR of an image on the server's disk

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use docmerge_core::DocmergeConfig;
use docmerge_pipeline::MergeService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone, Debug)]
pub struct ApiState {
    pub service: MergeService,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl ApiState {
    /// State over an already-built service
    #[must_use]
    pub fn new(service: MergeService, max_upload_bytes: usize) -> Self {
        Self {
            service,
            max_upload_bytes,
        }
    }

    /// Local-disk storage, in-memory records and the configured OCR command
    #[must_use]
    pub fn from_config(config: &DocmergeConfig) -> Self {
        Self::new(
            MergeService::from_config(config),
            config.server.max_upload_bytes,
        )
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Templates
        .route("/api/v1/forms/{form_id}/templates", post(create_template))
        .route("/api/v1/templates/{template_id}", get(get_template))
        .route("/api/v1/templates/{template_id}/variables", post(add_variable))
        .route(
            "/api/v1/templates/{template_id}/variables/{name}",
            patch(update_variable),
        )
        // Entries
        .route("/api/v1/forms/{form_id}/entries", post(create_entry))
        // Merge and OCR
        .route("/api/v1/merge", post(merge))
        .route("/api/v1/ocr", post(ocr))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
