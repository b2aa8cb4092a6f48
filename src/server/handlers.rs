//! HTTP request handlers

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::preprocessing::{clean, CleaningOptions};
use crate::profiler::profile;
use crate::training::{CancellationToken, ModelKey, ModelKind, ParamGrid};

use super::error::{Result, ServerError};
use super::state::AppState;

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Dataset handle
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub filename: String,
    /// Rows to return; 10 when omitted
    pub rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CleanRequest {
    pub filename: String,
    /// Cleaning steps; all off when omitted
    #[serde(default)]
    pub options: CleaningOptions,
}

#[derive(Debug, Deserialize)]
pub struct ModelSelectRequest {
    pub filename: String,
    pub target_column: String,
}

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub filename: String,
    pub target_column: String,
    /// Catalog name, e.g. `RandomForestClassifier`
    pub model_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TuneRequest {
    pub filename: String,
    pub target_column: String,
    pub model_name: String,
    /// Values to search; the default grid when omitted
    #[serde(default)]
    pub param_grid: ParamGrid,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Dataset the model is (or was) trained on
    pub filename: String,
    pub target_column: String,
    pub model_name: String,
    /// Dataset to score
    pub test_filename: String,
}

/// Run blocking work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)
}

/// Run a fit on the blocking pool under the configured timeout. On expiry the
/// fit is told to stop and the request fails with `Timeout`.
async fn with_training_timeout<T, F>(state: &Arc<AppState>, work: F) -> Result<T>
where
    F: FnOnce(&AppState, &CancellationToken) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let worker_state = Arc::clone(state);
    let worker_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || work(&worker_state, &worker_cancel));

    let secs = state.config.train_timeout_secs;
    match tokio::time::timeout(Duration::from_secs(secs), task).await {
        Ok(joined) => joined
            .map_err(|e| ServerError::Internal(e.to_string()))?
            .map_err(ServerError::from),
        Err(_) => {
            cancel.cancel();
            warn!(timeout_secs = secs, "Training timed out, cancelling");
            Err(PipelineError::Timeout(secs).into())
        }
    }
}

fn parse_model(name: &str) -> Result<ModelKind> {
    Ok(name.parse::<ModelKind>()?)
}

// ============================================================================
// Dataset Handlers
// ============================================================================

/// Upload and parse a data file
pub async fn upload_data(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServerError::BadRequest("Uploaded file has no filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;

        info!(file = %file_name, bytes = data.len(), "Received file");

        let worker = Arc::clone(&state);
        let handle = blocking(move || worker.store.put(&file_name, data.to_vec())).await?;

        return Ok(Json(serde_json::json!({
            "message": "File uploaded successfully",
            "filename": handle,
        })));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

pub async fn analyze_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse> {
    let dataset = state.store.get(&request.filename)?;
    Ok(Json(profile(&dataset)))
}

/// First rows of a dataset as row objects
pub async fn preview_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.store.preview(&request.filename, request.rows)?))
}

pub async fn clean_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CleanRequest>,
) -> Result<impl IntoResponse> {
    let worker = Arc::clone(&state);
    let (handle, warnings) = blocking(move || {
        let dataset = worker.store.get(&request.filename)?;
        let report = clean(&dataset, &request.options)?;
        let handle = worker.store.derive(&request.filename, report.dataset)?;
        Ok((handle, report.warnings))
    })
    .await?;

    Ok(Json(serde_json::json!({
        "message": "Data cleaned successfully",
        "cleaned_filename": handle,
        "warnings": warnings,
    })))
}

/// Raw bytes of a stored dataset as an attachment
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse> {
    let bytes = state.store.export(&filename)?;
    let content_type = if filename.to_ascii_lowercase().ends_with(".csv") {
        "text/csv"
    } else {
        "application/octet-stream"
    };
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type.to_string()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    ))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.list())
}

// ============================================================================
// Model Handlers
// ============================================================================

pub async fn select_models(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModelSelectRequest>,
) -> Result<impl IntoResponse> {
    let dataset = state.store.get(&request.filename)?;
    let selection = state.engine.select(&dataset, &request.target_column)?;
    Ok(Json(serde_json::json!({
        "models": selection.models,
        "task": selection.task,
    })))
}

pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<impl IntoResponse> {
    let model = parse_model(&request.model_name)?;
    let dataset = state.store.get(&request.filename)?;

    let result = with_training_timeout(&state, move |state, cancel| {
        state
            .engine
            .train(&request.filename, &dataset, &request.target_column, model, cancel)
    })
    .await?;

    Ok(Json(result))
}

pub async fn feature_importance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<impl IntoResponse> {
    let model = parse_model(&request.model_name)?;
    let dataset = state.store.get(&request.filename)?;

    let ranking = with_training_timeout(&state, move |state, cancel| {
        state
            .engine
            .explain(&request.filename, &dataset, &request.target_column, model, cancel)
    })
    .await?;

    Ok(Json(ranking))
}

/// Cross-validated grid search over ensemble hyperparameters
pub async fn tune_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TuneRequest>,
) -> Result<impl IntoResponse> {
    let model = parse_model(&request.model_name)?;
    let dataset = state.store.get(&request.filename)?;

    let result = with_training_timeout(&state, move |state, cancel| {
        state
            .engine
            .tune(&dataset, &request.target_column, model, &request.param_grid, cancel)
    })
    .await?;

    Ok(Json(result))
}

/// Score another dataset and store it with a prediction column
pub async fn predict_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<impl IntoResponse> {
    let model = parse_model(&request.model_name)?;
    let training = state.store.get(&request.filename)?;
    let other = state.store.get(&request.test_filename)?;

    let (handle, rows, scores) = with_training_timeout(&state, move |state, cancel| {
        let key = ModelKey::new(&request.filename, &request.target_column, model);
        let prediction = state.engine.predict(&key, &training, &other, cancel)?;
        let rows = prediction.dataset.n_rows();
        let handle = state
            .store
            .derive_with_prefix(&request.test_filename, "predicted", prediction.dataset)?;
        Ok((handle, rows, prediction.scores))
    })
    .await?;

    Ok(Json(serde_json::json!({
        "message": "Predictions generated successfully",
        "predicted_filename": handle,
        "rows": rows,
        "scores": scores,
    })))
}

/// Every training result recorded since startup
pub async fn model_results(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.results())
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "AutoML Data Pipeline API" }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "datasets": state.store.len(),
        "uptime_secs": uptime.num_seconds(),
        "model_cache": state.engine.cache_stats(),
    }))
}
