//! In-memory dataset store
//!
//! Every dataset version lives behind an `Arc` and is never mutated. The only
//! critical section is handle allocation, done under the write lock so two
//! concurrent `put`/`derive` calls can never produce the same handle.

use super::io::{read_dataset, write_csv, DataFormat};
use super::Dataset;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of rows returned by [`DatasetStore::preview`]
pub const DEFAULT_PREVIEW_ROWS: usize = 10;
/// Upper bound on rows returned by [`DatasetStore::preview`]
pub const MAX_PREVIEW_ROWS: usize = 1000;

/// Where a stored dataset came from
#[derive(Debug, Clone)]
pub enum DatasetOrigin {
    /// Uploaded file, kept byte-for-byte for download
    Upload { format: DataFormat, bytes: Arc<Vec<u8>> },
    /// Produced from another stored dataset
    Derived { parent: String },
}

#[derive(Debug, Clone)]
struct StoredDataset {
    dataset: Arc<Dataset>,
    origin: DatasetOrigin,
    created_at: DateTime<Utc>,
}

/// Listing entry for a stored dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    /// Handle used by every other operation
    pub handle: String,
    /// Row count
    pub rows: usize,
    /// Column count
    pub columns: usize,
    /// Handle of the dataset this version was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// When this version was stored
    pub created_at: DateTime<Utc>,
}

/// Handle-keyed store of immutable dataset versions
#[derive(Debug, Default)]
pub struct DatasetStore {
    entries: RwLock<HashMap<String, StoredDataset>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse uploaded bytes and store them under a handle derived from `filename`
    pub fn put(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let base = sanitize_filename(filename)?;
        let format = DataFormat::from_filename(&base)?;
        let dataset = read_dataset(&bytes, format)?;
        let (rows, cols) = dataset.shape();

        let stored = StoredDataset {
            dataset: Arc::new(dataset),
            origin: DatasetOrigin::Upload {
                format,
                bytes: Arc::new(bytes),
            },
            created_at: Utc::now(),
        };

        let handle = {
            let mut entries = self.entries.write();
            let handle = allocate(&entries, &base, |n| suffixed(&base, n));
            entries.insert(handle.clone(), stored);
            handle
        };

        info!(handle = %handle, rows, cols, "Dataset uploaded");
        Ok(handle)
    }

    pub fn get(&self, handle: &str) -> Result<Arc<Dataset>> {
        self.entries
            .read()
            .get(handle)
            .map(|e| Arc::clone(&e.dataset))
            .ok_or_else(|| PipelineError::NotFound(handle.to_string()))
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.entries.read().contains_key(handle)
    }

    /// Store a cleaned version derived from `parent`, returning its fresh handle
    pub fn derive(&self, parent: &str, dataset: Dataset) -> Result<String> {
        self.derive_with_prefix(parent, "cleaned", dataset)
    }

    /// Store a version derived from `parent` under `<prefix>_<stem>.csv`,
    /// or `<prefix>_<stem>_<n>.csv` once that handle is taken
    pub fn derive_with_prefix(&self, parent: &str, prefix: &str, dataset: Dataset) -> Result<String> {
        let stem = Path::new(parent)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(parent)
            .to_string();
        let base = format!("{}_{}.csv", prefix, stem);
        let (rows, cols) = dataset.shape();

        let handle = {
            let mut entries = self.entries.write();
            if !entries.contains_key(parent) {
                return Err(PipelineError::NotFound(parent.to_string()));
            }
            let handle = allocate(&entries, &base, |n| format!("{}_{}_{}.csv", prefix, stem, n));
            entries.insert(
                handle.clone(),
                StoredDataset {
                    dataset: Arc::new(dataset),
                    origin: DatasetOrigin::Derived {
                        parent: parent.to_string(),
                    },
                    created_at: Utc::now(),
                },
            );
            handle
        };

        info!(handle = %handle, parent = %parent, rows, cols, "Derived dataset stored");
        Ok(handle)
    }

    pub fn origin(&self, handle: &str) -> Result<DatasetOrigin> {
        self.entries
            .read()
            .get(handle)
            .map(|e| e.origin.clone())
            .ok_or_else(|| PipelineError::NotFound(handle.to_string()))
    }

    /// Downloadable bytes: the original upload, or a CSV rendering for derived versions
    pub fn export(&self, handle: &str) -> Result<Vec<u8>> {
        let (dataset, origin) = {
            let entries = self.entries.read();
            let entry = entries
                .get(handle)
                .ok_or_else(|| PipelineError::NotFound(handle.to_string()))?;
            (Arc::clone(&entry.dataset), entry.origin.clone())
        };

        match origin {
            DatasetOrigin::Upload { bytes, .. } => Ok(bytes.as_ref().clone()),
            DatasetOrigin::Derived { .. } => {
                debug!(handle = %handle, "Rendering derived dataset as CSV");
                write_csv(&dataset)
            }
        }
    }

    /// First rows of a dataset as JSON records
    pub fn preview(&self, handle: &str, rows: Option<usize>) -> Result<Vec<serde_json::Value>> {
        let n = rows.unwrap_or(DEFAULT_PREVIEW_ROWS).min(MAX_PREVIEW_ROWS);
        Ok(self.get(handle)?.to_records(n))
    }

    /// All stored datasets, oldest first
    pub fn list(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> = self
            .entries
            .read()
            .iter()
            .map(|(handle, entry)| {
                let (rows, columns) = entry.dataset.shape();
                DatasetSummary {
                    handle: handle.clone(),
                    rows,
                    columns,
                    parent: match &entry.origin {
                        DatasetOrigin::Derived { parent } => Some(parent.clone()),
                        DatasetOrigin::Upload { .. } => None,
                    },
                    created_at: entry.created_at,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.handle.cmp(&b.handle)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn allocate<V>(entries: &HashMap<String, V>, base: &str, nth: impl Fn(usize) -> String) -> String {
    if !entries.contains_key(base) {
        return base.to_string();
    }
    (1..)
        .map(nth)
        .find(|candidate| !entries.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn suffixed(filename: &str, n: usize) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, n, ext),
        None => format!("{}_{}", stem, n),
    }
}

/// Strip any directory components a client sent along with the file name
fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(PipelineError::UnsupportedFormat(format!(
            "invalid file name '{}'",
            filename
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, Value};

    const CSV: &[u8] = b"a,b\n1,x\n2,y\n";

    #[test]
    fn test_put_and_get() {
        let store = DatasetStore::new();
        let handle = store.put("data.csv", CSV.to_vec()).unwrap();
        assert_eq!(handle, "data.csv");
        assert_eq!(store.get(&handle).unwrap().shape(), (2, 2));
    }

    #[test]
    fn test_put_collision_gets_suffix() {
        let store = DatasetStore::new();
        let first = store.put("data.csv", CSV.to_vec()).unwrap();
        let second = store.put("data.csv", CSV.to_vec()).unwrap();
        let third = store.put("data.csv", CSV.to_vec()).unwrap();
        assert_eq!(first, "data.csv");
        assert_eq!(second, "data_1.csv");
        assert_eq!(third, "data_2.csv");
    }

    #[test]
    fn test_put_strips_directories() {
        let store = DatasetStore::new();
        let handle = store.put("../../etc/data.csv", CSV.to_vec()).unwrap();
        assert_eq!(handle, "data.csv");
        assert!(store.put("dir/", CSV.to_vec()).is_err());
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        let store = DatasetStore::new();
        assert!(matches!(store.get("nope.csv"), Err(PipelineError::NotFound(_))));
        assert!(matches!(store.export("nope.csv"), Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn test_derive_handles_encode_lineage() {
        let store = DatasetStore::new();
        let parent = store.put("sales.xlsx", Vec::new()).unwrap_err();
        assert!(matches!(parent, PipelineError::UnsupportedFormat(_)));

        let parent = store.put("sales.csv", CSV.to_vec()).unwrap();
        let ds = Dataset::new(vec![Column::from_values("a", [1i64])]).unwrap();
        let first = store.derive(&parent, ds.clone()).unwrap();
        let second = store.derive(&parent, ds).unwrap();
        assert_eq!(first, "cleaned_sales.csv");
        assert_eq!(second, "cleaned_sales_1.csv");
        assert!(matches!(
            store.origin(&first).unwrap(),
            DatasetOrigin::Derived { parent: p } if p == "sales.csv"
        ));
    }

    #[test]
    fn test_derive_from_unknown_parent_fails() {
        let store = DatasetStore::new();
        let ds = Dataset::new(vec![Column::from_values("a", [1i64])]).unwrap();
        assert!(matches!(store.derive("ghost.csv", ds), Err(PipelineError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_export_upload_returns_original_bytes() {
        let store = DatasetStore::new();
        let handle = store.put("data.csv", CSV.to_vec()).unwrap();
        assert_eq!(store.export(&handle).unwrap(), CSV.to_vec());
    }

    #[test]
    fn test_export_derived_renders_csv() {
        let store = DatasetStore::new();
        let parent = store.put("data.csv", CSV.to_vec()).unwrap();
        let ds = Dataset::new(vec![Column::new("a", vec![Value::Float(1.5), Value::Missing])]).unwrap();
        let handle = store.derive(&parent, ds).unwrap();
        let text = String::from_utf8(store.export(&handle).unwrap()).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["a", "1.5", ""]);
    }

    #[test]
    fn test_preview_defaults_and_caps() {
        let store = DatasetStore::new();
        let mut csv = String::from("n\n");
        for i in 0..20 {
            csv.push_str(&format!("{}\n", i));
        }
        let handle = store.put("n.csv", csv.into_bytes()).unwrap();
        assert_eq!(store.preview(&handle, None).unwrap().len(), DEFAULT_PREVIEW_ROWS);
        assert_eq!(store.preview(&handle, Some(3)).unwrap().len(), 3);
        assert_eq!(store.preview(&handle, Some(5000)).unwrap().len(), 20);
    }

    #[test]
    fn test_list_reports_lineage() {
        let store = DatasetStore::new();
        let parent = store.put("data.csv", CSV.to_vec()).unwrap();
        let derived = store
            .derive(&parent, Dataset::new(vec![Column::from_values("a", [1i64])]).unwrap())
            .unwrap();

        let list = store.list();
        assert_eq!(list.len(), 2);
        let entry = list.iter().find(|s| s.handle == derived).unwrap();
        assert_eq!(entry.parent.as_deref(), Some("data.csv"));
        assert_eq!((entry.rows, entry.columns), (1, 1));
    }
}
