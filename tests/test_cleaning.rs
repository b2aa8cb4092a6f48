//! Integration tests for profiling and the cleaning engine

use automl_pipeline::dataset::io::read_dataset;
use automl_pipeline::prelude::*;
use automl_pipeline::preprocessing::remove_duplicates;

fn csv(text: &str) -> Dataset {
    read_dataset(text.as_bytes(), DataFormat::Csv).unwrap()
}

fn floats(column: &Column) -> Vec<Option<f64>> {
    column.values().iter().map(Value::as_f64).collect()
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_all_steps_disabled_is_identity() {
    let ds = csv("a,b,c\n1,x,true\n,y,false\n1,x,true\n3.5,,\n");
    let options = CleaningOptions::default();
    assert!(options.is_noop());

    let report = clean(&ds, &options).unwrap();
    assert_eq!(report.dataset, ds);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_dedup_is_idempotent() {
    let ds = csv("a,b\n1,x\n1,x\n2,y\n,\n,\n2,y\n");
    let once = remove_duplicates(&ds);
    let twice = remove_duplicates(&once);
    assert_eq!(once, twice);
    assert_eq!(once.n_rows(), 3);
}

#[test]
fn test_mean_fill_leaves_no_numeric_missing() {
    let ds = csv("a,b,empty\n1,2.5,\n,3.5,\n4,,\n");
    for strategy in [FillStrategy::Mean, FillStrategy::Median] {
        let report = clean(&ds, &CleaningOptions::new().with_fill(strategy)).unwrap();
        let cleaned = &report.dataset;
        assert_eq!(cleaned.column("a").unwrap().missing_count(), 0);
        assert_eq!(cleaned.column("b").unwrap().missing_count(), 0);
        // The all-missing column stays missing and is reported
        assert_eq!(cleaned.column("empty").unwrap().missing_count(), 3);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].column, "empty");
    }
}

#[test]
fn test_one_hot_rows_sum_to_one() {
    let ds = csv("id,color\n1,red\n2,green\n3,\n4,blue\n5,red\n");
    let report = clean(&ds, &CleaningOptions::new().with_encoder(EncoderKind::OneHot)).unwrap();
    let cleaned = &report.dataset;

    let onehot: Vec<&Column> = cleaned
        .columns()
        .iter()
        .filter(|c| c.name().starts_with("color_"))
        .collect();
    assert_eq!(onehot.len(), 3);
    assert!(onehot.iter().all(|c| c.kind() == ColumnKind::Boolean));

    for row in 0..cleaned.n_rows() {
        let sum: usize = onehot
            .iter()
            .filter(|c| c.values()[row] == Value::Bool(true))
            .count();
        let expected = if row == 2 { 0 } else { 1 };
        assert_eq!(sum, expected, "row {}", row);
    }
}

#[test]
fn test_standard_scaling_moments() {
    let ds = csv("x\n1\n2\n3\n4\n10\n");
    let report = clean(&ds, &CleaningOptions::new().with_scaler(ScalerKind::Standard)).unwrap();
    let values: Vec<f64> = floats(report.dataset.column("x").unwrap())
        .into_iter()
        .flatten()
        .collect();

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert!(mean.abs() < 1e-9);
    assert!((std - 1.0).abs() < 1e-9);
}

#[test]
fn test_fill_mean_scenario() {
    let ds = Dataset::from_rows(
        &["a", "b"],
        vec![
            vec![Value::Int(1), "x".into()],
            vec![Value::Int(2), "y".into()],
            vec![Value::Missing, "x".into()],
        ],
    )
    .unwrap();

    let options: CleaningOptions = serde_json::from_value(serde_json::json!({
        "handleMissing": "fill",
        "fillStrategy": "mean",
        "removeDuplicates": true,
    }))
    .unwrap();
    let report = clean(&ds, &options).unwrap();

    assert_eq!(report.dataset.n_rows(), 3);
    assert_eq!(
        floats(report.dataset.column("a").unwrap()),
        vec![Some(1.0), Some(2.0), Some(1.5)]
    );
    // Input is untouched
    assert!(ds.column("a").unwrap().values()[2].is_missing());
}

// ============================================================================
// Step ordering and edge cases
// ============================================================================

#[test]
fn test_drop_then_dedup() {
    let ds = csv("a,b\n1,x\n,x\n1,x\n2,y\n");
    let options = CleaningOptions::new().with_drop_missing().with_remove_duplicates(true);
    let report = clean(&ds, &options).unwrap();
    assert_eq!(report.dataset.n_rows(), 2);
}

#[test]
fn test_constant_column_is_not_scaled() {
    let ds = csv("c\n5\n5\n5\n");
    for scaler in [ScalerKind::Standard, ScalerKind::MinMax, ScalerKind::Robust] {
        let report = clean(&ds, &CleaningOptions::new().with_scaler(scaler)).unwrap();
        assert_eq!(
            floats(report.dataset.column("c").unwrap()),
            vec![Some(5.0), Some(5.0), Some(5.0)]
        );
    }
}

#[test]
fn test_label_encoding_first_seen_order() {
    let ds = csv("city\nparis\nrome\nparis\noslo\n");
    let report = clean(&ds, &CleaningOptions::new().with_encoder(EncoderKind::Label)).unwrap();
    let codes: Vec<Value> = report.dataset.column("city").unwrap().values().to_vec();
    assert_eq!(codes, vec![Value::Int(0), Value::Int(1), Value::Int(0), Value::Int(2)]);
}

#[test]
fn test_unknown_option_values_are_noops() {
    let options: CleaningOptions = serde_json::from_value(serde_json::json!({
        "handleMissing": "interpolate",
        "scaler": "quantile",
        "encoder": null,
    }))
    .unwrap();
    assert!(options.is_noop());
}

#[test]
fn test_profile_ignores_missing_for_inference() {
    let ds = csv("n,f,b,t\n1,1.5,true,a\nNA,,False,\n3,2,,c\n");
    let report = profile(&ds);
    assert_eq!(report.kind_of("n"), Some(ColumnKind::Integer));
    assert_eq!(report.kind_of("f"), Some(ColumnKind::Float));
    assert_eq!(report.kind_of("b"), Some(ColumnKind::Boolean));
    assert_eq!(report.kind_of("t"), Some(ColumnKind::Categorical));
    assert_eq!(report.column("n").unwrap().missing, 1);
    assert_eq!(report.shape, (3, 4));
}
