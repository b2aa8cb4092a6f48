//! AutoML Pipeline CLI Module
//!
//! Command-line access to profiling, cleaning, model selection, training and
//! the HTTP server.

use clap::{Parser, Subcommand};
use colored::*;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::dataset::io::{read_dataset, write_csv};
use crate::dataset::{DataFormat, Dataset};
use crate::preprocessing::{clean, CleaningOptions, MissingStrategy};
use crate::profiler::profile;
use crate::server::{run_server, ServerConfig};
use crate::training::{
    CancellationToken, EvaluationScores, ModelKey, ModelKind, ParamGrid, Scores, TrainEngine, TrainingConfig,
};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "automl-pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Data cleaning, model selection and training for tabular datasets")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server port (default: API_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host (default: API_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Training timeout in seconds (default: TRAIN_TIMEOUT_SECS or 300)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show inferred column types, missing counts and shape
    Analyze {
        /// Input data file (CSV, TSV or spreadsheet)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Clean a dataset and write the result as CSV
    Clean {
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Missing value handling (drop, fill, none)
        #[arg(long, default_value = "none")]
        missing: String,

        /// Fill strategy (mean, median, mode)
        #[arg(long, default_value = "mean")]
        fill: String,

        /// Remove duplicate rows
        #[arg(long)]
        dedup: bool,

        /// Scaler (none, standard, minmax, robust)
        #[arg(long, default_value = "none")]
        scaler: String,

        /// Encoder (none, onehot, label)
        #[arg(long, default_value = "none")]
        encoder: String,
    },

    /// List the models applicable to a target column
    Select {
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,
    },

    /// Train and evaluate a model
    Train {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,

        /// Model name, e.g. RandomForestClassifier
        #[arg(short, long)]
        model: String,
    },

    /// Rank features by importance for a tree ensemble
    Explain {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        model: String,
    },

    /// Grid search n_estimators and max_depth for a tree ensemble
    Tune {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        model: String,

        /// Cross-validation folds
        #[arg(long, default_value = "3")]
        folds: usize,
    },

    /// Train on one dataset, then score another and write it with a Prediction column
    Predict {
        /// Training data file
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        model: String,

        /// Data file to score
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<Dataset> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let format = DataFormat::from_filename(name)?;
    let bytes = std::fs::read(path)?;
    Ok(read_dataset(&bytes, format)?)
}

fn load_with_progress(path: &Path) -> anyhow::Result<Dataset> {
    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_data(path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.n_cols(),
        start.elapsed()
    ));
    Ok(dataset)
}

/// Parse an option the same way the HTTP API does (unknown values are no-ops)
fn parse_option<T: DeserializeOwned>(value: &str) -> anyhow::Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value.to_string()))?)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(port: Option<u16>, host: Option<String>, timeout: Option<u64>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(timeout) = timeout {
        config.train_timeout_secs = timeout;
    }
    run_server(config).await
}

pub fn cmd_analyze(data_path: &Path) -> anyhow::Result<()> {
    section("Analyze");
    let dataset = load_with_progress(data_path)?;
    let report = profile(&dataset);

    println!();
    for column in &report.columns {
        let missing = if column.missing > 0 {
            format!("{} missing", column.missing).yellow()
        } else {
            "complete".normal()
        };
        println!(
            "  {:<24} {:<12} {:>6} distinct   {}",
            column.name.white(),
            accent(&column.kind.to_string()),
            column.distinct,
            missing
        );
    }
    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_clean(
    data_path: &Path,
    output_path: &Path,
    missing: &str,
    fill: &str,
    dedup: bool,
    scaler: &str,
    encoder: &str,
) -> anyhow::Result<()> {
    section("Clean");
    let dataset = load_with_progress(data_path)?;

    let mut options = CleaningOptions::new()
        .with_remove_duplicates(dedup)
        .with_scaler(parse_option(scaler)?)
        .with_encoder(parse_option(encoder)?);
    match parse_option::<MissingStrategy>(missing)? {
        MissingStrategy::Drop => options = options.with_drop_missing(),
        MissingStrategy::Fill => options = options.with_fill(parse_option(fill)?),
        MissingStrategy::None => {}
    }

    step_run("Cleaning");
    let start = Instant::now();
    let report = clean(&dataset, &options)?;
    step_done(&format!("{:?}", start.elapsed()));

    for warning in &report.warnings {
        println!("  {} {}: {}", "!".yellow(), warning.column, warning.message);
    }

    step_run(&format!("Saving → {}", output_path.display()));
    std::fs::write(output_path, write_csv(&report.dataset)?)?;
    step_done(&format!(
        "{} rows × {} cols",
        report.dataset.n_rows(),
        report.dataset.n_cols()
    ));
    println!();
    Ok(())
}

pub fn cmd_select(data_path: &Path, target: &str) -> anyhow::Result<()> {
    section("Select");
    let dataset = load_with_progress(data_path)?;
    let engine = TrainEngine::new(TrainingConfig::default());
    let selection = engine.select(&dataset, target)?;

    println!();
    kv("Task", &selection.task.to_string());
    kv("Usable rows", &selection.usable_rows.to_string());
    for model in &selection.models {
        println!("  {} {}", ok("•"), model);
    }
    println!();
    Ok(())
}

pub fn cmd_train(data_path: &Path, target: &str, model: &str) -> anyhow::Result<()> {
    section("Train");
    let model: ModelKind = model.parse()?;
    let dataset = load_with_progress(data_path)?;
    let handle = data_path.display().to_string();

    step_run(&format!("Training {}", model.to_string().cyan()));
    let start = Instant::now();
    let engine = TrainEngine::new(TrainingConfig::default());
    let result = engine.train(&handle, &dataset, target, model, &CancellationToken::new())?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    kv("Task", &result.meta.task.to_string());
    kv("Train / test rows", &format!("{} / {}", result.meta.train_size, result.meta.test_size));
    match &result.scores {
        Scores::Classification {
            accuracy,
            classification_report,
        } => {
            kv("Accuracy", &format!("{:.4}", accuracy));
            for (label, scores) in &classification_report.classes {
                println!(
                    "  {:<18} precision {:.3}  recall {:.3}  f1 {:.3}  support {}",
                    muted(label),
                    scores.precision,
                    scores.recall,
                    scores.f1,
                    scores.support
                );
            }
        }
        Scores::Regression { mse, r2_score } => {
            kv("MSE", &format!("{:.4}", mse));
            kv("R²", &format!("{:.4}", r2_score));
        }
    }
    println!();
    Ok(())
}

pub fn cmd_explain(data_path: &Path, target: &str, model: &str) -> anyhow::Result<()> {
    section("Explain");
    let model: ModelKind = model.parse()?;
    let dataset = load_with_progress(data_path)?;
    let handle = data_path.display().to_string();

    let engine = TrainEngine::new(TrainingConfig::default());
    let ranking = engine.explain(&handle, &dataset, target, model, &CancellationToken::new())?;

    println!();
    for entry in ranking {
        let bar = "█".repeat((entry.importance * 40.0).round() as usize);
        println!("  {:<24} {:.4} {}", entry.feature.white(), entry.importance, accent(&bar));
    }
    println!();
    Ok(())
}

pub fn cmd_tune(data_path: &Path, target: &str, model: &str, folds: usize) -> anyhow::Result<()> {
    section("Tune");
    let model: ModelKind = model.parse()?;
    let dataset = load_with_progress(data_path)?;
    let grid = ParamGrid::default();

    step_run(&format!(
        "Searching {} candidates × {} folds for {}",
        grid.candidates().len(),
        folds,
        model.to_string().cyan()
    ));
    let start = Instant::now();
    let engine = TrainEngine::new(TrainingConfig::default().with_cv_folds(folds));
    let result = engine.tune(&dataset, target, model, &grid, &CancellationToken::new())?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    for candidate in &result.candidates {
        let depth = candidate
            .params
            .max_depth
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        let line = format!(
            "n_estimators {:<5} max_depth {:<5} {} {:.4} ± {:.4}",
            candidate.params.n_estimators, depth, result.metric, candidate.mean_score, candidate.std_score
        );
        if candidate.params == result.best_params {
            println!("  {} {}", ok("★"), line.white().bold());
        } else {
            println!("    {}", muted(&line));
        }
    }
    println!();
    kv("Best score", &format!("{:.4}", result.best_score));
    println!();
    Ok(())
}

pub fn cmd_predict(data_path: &Path, target: &str, model: &str, input: &Path, output: &Path) -> anyhow::Result<()> {
    section("Predict");
    let model: ModelKind = model.parse()?;
    let training = load_with_progress(data_path)?;
    let other = load_with_progress(input)?;

    step_run(&format!("Scoring with {}", model.to_string().cyan()));
    let start = Instant::now();
    let engine = TrainEngine::new(TrainingConfig::default());
    let key = ModelKey::new(&data_path.display().to_string(), target, model);
    let prediction = engine.predict(&key, &training, &other, &CancellationToken::new())?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    match &prediction.scores {
        Some(EvaluationScores::Classification {
            accuracy,
            precision,
            recall,
            f1_score,
            ..
        }) => {
            kv("Accuracy", &format!("{:.4}", accuracy));
            kv("Precision", &format!("{:.4}", precision));
            kv("Recall", &format!("{:.4}", recall));
            kv("F1", &format!("{:.4}", f1_score));
        }
        Some(EvaluationScores::Regression { mse, r2_score, .. }) => {
            kv("MSE", &format!("{:.4}", mse));
            kv("R²", &format!("{:.4}", r2_score));
        }
        None => kv("Scores", &format!("no '{}' column to compare against", target)),
    }

    step_run(&format!("Saving → {}", output.display()));
    std::fs::write(output, write_csv(&prediction.dataset)?)?;
    step_done(&format!("{} rows", prediction.dataset.n_rows()));
    println!();
    Ok(())
}
