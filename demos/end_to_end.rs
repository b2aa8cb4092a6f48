//! Upload, clean, train and explain a small churn dataset in-process.
//!
//! Run with `cargo run --example end_to_end`. Set `RUST_LOG=automl_pipeline=debug`
//! to follow each step in the logs.

use automl_pipeline::prelude::*;

fn churn_csv() -> String {
    let plans = ["basic", "plus", "pro"];
    let mut csv = String::from("tenure,monthly_spend,plan,support_calls,churned\n");
    for i in 0..120 {
        let tenure = (i * 7) % 60;
        let spend = 20.0 + ((i * 13) % 50) as f64 * 1.5;
        let calls = (i * 3) % 6;
        let churned = tenure < 12 && calls > 2;
        // A few gaps and a duplicate for the cleaning step to handle
        let spend = if i % 17 == 0 { String::new() } else { format!("{:.2}", spend) };
        let line = format!("{},{},{},{},{}\n", tenure, spend, plans[i % 3], calls, churned);
        csv.push_str(&line);
        if i == 5 {
            csv.push_str(&line);
        }
    }
    csv
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "automl_pipeline=info".into()),
        )
        .init();

    let store = DatasetStore::new();
    let handle = store.put("churn.csv", churn_csv().into_bytes())?;

    let report = profile(&*store.get(&handle)?);
    println!("Uploaded {} with shape {:?}", handle, report.shape);
    for column in &report.columns {
        println!("  {:<14} {:<12} {} missing", column.name, column.kind.to_string(), column.missing);
    }

    let options = CleaningOptions::new()
        .with_fill(FillStrategy::Median)
        .with_remove_duplicates(true);
    let cleaned = clean(&*store.get(&handle)?, &options)?;
    let cleaned_handle = store.derive(&handle, cleaned.dataset)?;
    let dataset = store.get(&cleaned_handle)?;
    println!("Cleaned into {} with {} rows", cleaned_handle, dataset.n_rows());

    let engine = TrainEngine::new(TrainingConfig::default());
    let selection = engine.select(&dataset, "churned")?;
    println!("Task {} supports {} models", selection.task, selection.models.len());

    let cancel = CancellationToken::new();
    let model = ModelKind::RandomForestClassifier;
    let result = engine.train(&cleaned_handle, &dataset, "churned", model, &cancel)?;
    if let Some(accuracy) = result.accuracy() {
        println!("{} accuracy on held-out rows: {:.3}", model, accuracy);
    }

    // Served from the model cache filled by `train`
    let ranking = engine.explain(&cleaned_handle, &dataset, "churned", model, &cancel)?;
    println!("Feature importances:");
    for entry in ranking {
        println!("  {:<18} {:.4}", entry.feature, entry.importance);
    }

    Ok(())
}
