//! AutoML Pipeline - data cleaning and model training for tabular datasets
//!
//! This crate provides:
//! - An in-memory store of immutable dataset versions (CSV, TSV, spreadsheets)
//! - Column type inference and dataset profiling
//! - A cleaning engine (missing values, duplicates, scaling, encoding)
//! - Task detection, model selection, training and evaluation
//! - Feature importances for tree ensembles
//! - An HTTP server and CLI over all of the above
//!
//! # Modules
//!
//! - [`dataset`] - Typed tabular values, ingest/export and the dataset store
//! - [`profiler`] - Type inference and missing-value profiles
//! - [`preprocessing`] - The cleaning engine
//! - [`training`] - Model selection, training engine and model families
//! - [`cache`] - Bounded LRU cache for fitted models
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod dataset;
pub mod profiler;

// Core ML modules
pub mod preprocessing;
pub mod training;

// Infrastructure
pub mod cache;

// Services
pub mod server;
pub mod cli;

pub use error::{PipelineError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dataset::{Column, ColumnKind, DataFormat, Dataset, DatasetStore, Value};
    pub use crate::error::{PipelineError, Result};
    pub use crate::preprocessing::{
        clean, CleanReport, CleaningOptions, EncoderKind, FillStrategy, MissingStrategy, ScalerKind,
    };
    pub use crate::profiler::{profile, DatasetProfile};
    pub use crate::training::{
        select, CancellationToken, EvaluationScores, FeatureImportance, ModelKey, ModelKind, ModelResult, ParamGrid,
        Prediction, TaskKind, TrainEngine, TrainingConfig, TuneResult,
    };
}
