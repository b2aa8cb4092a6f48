//! Duplicate row removal

use crate::dataset::{CellKey, Dataset};
use std::collections::HashSet;

/// Keep the first occurrence of every row, comparing all cells (missing equals missing)
pub fn remove_duplicates(dataset: &Dataset) -> Dataset {
    let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(dataset.n_rows());
    let keep: Vec<usize> = (0..dataset.n_rows())
        .filter(|&i| seen.insert(dataset.row(i).into_iter().map(|v| v.key()).collect()))
        .collect();

    if keep.len() == dataset.n_rows() {
        dataset.clone()
    } else {
        dataset.select_rows(&keep)
    }
}
