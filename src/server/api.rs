//! API route definitions

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, state::AppState};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the API documentation for supported methods.",
        })),
    )
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(_)) => {
            warn!("CORS_ORIGIN is not a valid header value, allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.max_upload_size;
    let cors = cors_layer(state.config.cors_origin.as_deref());

    let api_routes = Router::new()
        // Datasets
        .route("/upload", post(handlers::upload_data))
        .route("/analyze", post(handlers::analyze_data))
        .route("/preview", post(handlers::preview_data))
        .route("/clean", post(handlers::clean_dataset))
        .route("/download/:filename", get(handlers::download_file))
        .route("/datasets", get(handlers::list_datasets))
        // Models
        .route("/models/select", post(handlers::select_models))
        .route("/models/train", post(handlers::train_model))
        .route("/models/feature-importance", post(handlers::feature_importance))
        .route("/models/tune", post(handlers::tune_model))
        .route("/models/predict", post(handlers::predict_dataset))
        .route("/models/results", get(handlers::model_results))
        // System
        .route("/health", get(handlers::health_check))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    Router::new()
        .nest("/api", api_routes)
        .route("/", get(handlers::root))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
