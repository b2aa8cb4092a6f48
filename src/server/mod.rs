//! AutoML Pipeline Server Module
//!
//! HTTP façade over the dataset store, profiler, cleaning engine and
//! training engine. All routes live under `/api`.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::training::DEFAULT_CACHE_CAPACITY;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, from `API_HOST`
    pub host: String,
    /// Bind port, from `API_PORT`
    pub port: u16,
    /// Request body limit in bytes for uploads
    pub max_upload_size: usize,
    /// Allowed CORS origin; any origin when `None`
    pub cors_origin: Option<String>,
    /// Wall-clock budget for one training, tuning, importance or prediction request
    pub train_timeout_secs: u64,
    /// Fitted models kept for feature-importance lookups
    pub model_cache_size: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 8000),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 100 * 1024 * 1024), // 100MB
            cors_origin: std::env::var("CORS_ORIGIN")
                .ok()
                .filter(|origin| !origin.is_empty() && origin != "*"),
            train_timeout_secs: env_or("TRAIN_TIMEOUT_SECS", 300),
            model_cache_size: env_or("MODEL_CACHE_SIZE", DEFAULT_CACHE_CAPACITY),
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();

    let state = Arc::new(AppState::new(config.clone()));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        train_timeout_secs = config.train_timeout_secs,
        model_cache_size = config.model_cache_size,
        started_at = %start_time.to_rfc3339(),
        "AutoML pipeline server starting"
    );
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    // Graceful shutdown on ctrl+c
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c, shutting down");
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        if std::env::var("API_PORT").is_err() {
            assert_eq!(config.port, 8000);
        }
        if std::env::var("MAX_UPLOAD_SIZE").is_err() {
            assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        }
        assert!(config.model_cache_size > 0);
    }
}
