//! Integration tests for the dataset store: ingest, versions, preview and export

use automl_pipeline::dataset::{DatasetOrigin, DatasetStore};
use automl_pipeline::prelude::*;
use std::sync::Arc;

const CSV: &str = "name,age,score\nann,31,1.5\nbob,,2.0\ncat,27,\n";

#[test]
fn test_put_get_roundtrip() {
    let store = DatasetStore::new();
    let handle = store.put("people.csv", CSV.as_bytes().to_vec()).unwrap();
    assert_eq!(handle, "people.csv");

    let ds = store.get(&handle).unwrap();
    assert_eq!(ds.shape(), (3, 3));
    assert_eq!(ds.column("age").unwrap().kind(), ColumnKind::Integer);
    assert_eq!(ds.column("score").unwrap().kind(), ColumnKind::Float);
    assert!(ds.column("age").unwrap().values()[1].is_missing());
}

#[test]
fn test_unknown_handle() {
    let store = DatasetStore::new();
    assert!(matches!(store.get("ghost.csv"), Err(PipelineError::NotFound(_))));
    assert!(matches!(
        store.derive("ghost.csv", Dataset::default()),
        Err(PipelineError::NotFound(_))
    ));
}

#[test]
fn test_unsupported_uploads() {
    let store = DatasetStore::new();
    assert!(matches!(
        store.put("image.png", vec![0x89, 0x50]),
        Err(PipelineError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        store.put("empty.csv", b"  \n".to_vec()),
        Err(PipelineError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        store.put("broken.xlsx", b"definitely not a workbook".to_vec()),
        Err(PipelineError::UnsupportedFormat(_))
    ));
    assert!(store.is_empty());
}

#[test]
fn test_spreadsheet_upload() {
    let store = DatasetStore::new();
    let bytes = include_bytes!("fixtures/people.xlsx").to_vec();
    let handle = store.put("people.xlsx", bytes.clone()).unwrap();
    assert_eq!(handle, "people.xlsx");

    let ds = store.get(&handle).unwrap();
    let report = profile(&ds);
    assert_eq!(report.shape, (4, 4));
    let kinds: Vec<(&str, ColumnKind, usize)> = report
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.kind, c.missing))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("name", ColumnKind::Categorical, 0),
            ("age", ColumnKind::Integer, 1),
            ("score", ColumnKind::Float, 1),
            ("member", ColumnKind::Boolean, 1),
        ]
    );

    // Sheet numbers arrive as floats; whole ones still read as integers
    assert_eq!(ds.column("age").unwrap().values()[0], Value::Int(31));
    assert_eq!(ds.column("score").unwrap().values()[1], Value::Float(2.0));
    assert_eq!(ds.column("member").unwrap().values()[1], Value::Bool(false));

    // Uploads download byte-for-byte
    assert_eq!(store.export(&handle).unwrap(), bytes);
}

#[test]
fn test_tsv_upload() {
    let store = DatasetStore::new();
    let handle = store.put("data.tsv", b"a\tb\n1\tx\n2\ty\n".to_vec()).unwrap();
    assert_eq!(store.get(&handle).unwrap().shape(), (2, 2));
}

#[test]
fn test_path_components_are_stripped() {
    let store = DatasetStore::new();
    let handle = store.put("../../etc/people.csv", CSV.as_bytes().to_vec()).unwrap();
    assert_eq!(handle, "people.csv");
}

#[test]
fn test_derived_versions_keep_parent() {
    let store = DatasetStore::new();
    let handle = store.put("people.csv", CSV.as_bytes().to_vec()).unwrap();
    let original = store.get(&handle).unwrap();

    let report = clean(&original, &CleaningOptions::new().with_drop_missing()).unwrap();
    let first = store.derive(&handle, report.dataset.clone()).unwrap();
    let second = store.derive(&handle, report.dataset).unwrap();

    assert_eq!(first, "cleaned_people.csv");
    assert_eq!(second, "cleaned_people_1.csv");
    assert_eq!(store.get(&first).unwrap().n_rows(), 1);
    // Original version is unchanged
    assert_eq!(store.get(&handle).unwrap().n_rows(), 3);

    match store.origin(&first).unwrap() {
        DatasetOrigin::Derived { parent } => assert_eq!(parent, "people.csv"),
        other => panic!("unexpected origin {:?}", other),
    }

    let listed: Vec<String> = store.list().into_iter().map(|s| s.handle).collect();
    assert_eq!(listed.len(), 3);
    assert!(listed.contains(&"cleaned_people_1.csv".to_string()));
}

#[test]
fn test_prefixed_versions() {
    let store = DatasetStore::new();
    let handle = store.put("people.csv", CSV.as_bytes().to_vec()).unwrap();
    let ds = store.get(&handle).unwrap();

    let predicted = store.derive_with_prefix(&handle, "predicted", (*ds).clone()).unwrap();
    let cleaned = store.derive(&handle, (*ds).clone()).unwrap();
    let again = store.derive_with_prefix(&handle, "predicted", (*ds).clone()).unwrap();

    assert_eq!(predicted, "predicted_people.csv");
    assert_eq!(cleaned, "cleaned_people.csv");
    assert_eq!(again, "predicted_people_1.csv");
}

#[test]
fn test_preview_rows() {
    let store = DatasetStore::new();
    let handle = store.put("people.csv", CSV.as_bytes().to_vec()).unwrap();

    let rows = store.preview(&handle, Some(2)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "ann");
    assert_eq!(rows[0]["age"], 31);
    assert!(rows[1]["age"].is_null());

    let keys: Vec<&String> = rows[0].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["name", "age", "score"]);

    assert_eq!(store.preview(&handle, None).unwrap().len(), 3);
}

#[test]
fn test_export_upload_and_derived() {
    let store = DatasetStore::new();
    let handle = store.put("people.csv", CSV.as_bytes().to_vec()).unwrap();
    assert_eq!(store.export(&handle).unwrap(), CSV.as_bytes());

    let ds = store.get(&handle).unwrap();
    let report = clean(&ds, &CleaningOptions::new().with_drop_missing()).unwrap();
    let derived = store.derive(&handle, report.dataset).unwrap();
    let text = String::from_utf8(store.export(&derived).unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["name,age,score", "ann,31,1.5"]);
}

#[test]
fn test_concurrent_uploads_get_unique_handles() {
    let store = Arc::new(DatasetStore::new());
    let handles: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                scope.spawn(move || store.put("same.csv", b"a\n1\n".to_vec()).unwrap())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let mut unique = handles.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 8);
    assert_eq!(store.len(), 8);
}
