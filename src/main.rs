//! AutoML Pipeline - Main Entry Point
//!
//! Command-line tools and the HTTP server for the data pipeline.

use automl_pipeline::cli::{
    cmd_analyze, cmd_clean, cmd_explain, cmd_predict, cmd_select, cmd_serve, cmd_train, cmd_tune, Cli, Commands,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "automl_pipeline=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, timeout } => {
            cmd_serve(port, host, timeout).await?;
        }
        Commands::Analyze { data } => {
            cmd_analyze(&data)?;
        }
        Commands::Clean {
            data,
            output,
            missing,
            fill,
            dedup,
            scaler,
            encoder,
        } => {
            cmd_clean(&data, &output, &missing, &fill, dedup, &scaler, &encoder)?;
        }
        Commands::Select { data, target } => {
            cmd_select(&data, &target)?;
        }
        Commands::Train { data, target, model } => {
            cmd_train(&data, &target, &model)?;
        }
        Commands::Explain { data, target, model } => {
            cmd_explain(&data, &target, &model)?;
        }
        Commands::Tune {
            data,
            target,
            model,
            folds,
        } => {
            cmd_tune(&data, &target, &model, folds)?;
        }
        Commands::Predict {
            data,
            target,
            model,
            input,
            output,
        } => {
            cmd_predict(&data, &target, &model, &input, &output)?;
        }
    }

    Ok(())
}
