//! Application state management

use crate::dataset::DatasetStore;
use crate::training::{TrainEngine, TrainingConfig};

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    /// Settings the server was started with
    pub config: ServerConfig,
    /// Every uploaded and derived dataset version
    pub store: DatasetStore,
    /// Shared engine holding the model cache and result log
    pub engine: TrainEngine,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_training_config(config, TrainingConfig::default())
    }

    pub fn with_training_config(config: ServerConfig, training: TrainingConfig) -> Self {
        let engine = TrainEngine::with_cache_capacity(training, config.model_cache_size);
        Self {
            config,
            store: DatasetStore::new(),
            engine,
            started_at: chrono::Utc::now(),
        }
    }
}
