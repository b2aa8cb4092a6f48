//! Deterministic train/test partitioning

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};

/// Row indices of the two partitions, each in ascending order
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    /// Row indices to fit on
    pub train: Vec<usize>,
    /// Row indices to score on
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Materialize the partitions as `(x_train, x_test, y_train, y_test)`
    pub fn apply(&self, x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array2<f64>, Array1<f64>, Array1<f64>) {
        (
            x.select(Axis(0), &self.train),
            x.select(Axis(0), &self.test),
            y.select(Axis(0), &self.train),
            y.select(Axis(0), &self.test),
        )
    }
}

/// Number of held-out rows: `ceil(n_rows * fraction)`, at least one, leaving
/// at least one training row.
pub fn test_size(n_rows: usize, fraction: f64) -> usize {
    if n_rows < 2 {
        return 0;
    }
    // 1e-9 absorbs products like 15 * 0.2 landing a hair above the integer
    let raw = (n_rows as f64 * fraction - 1e-9).ceil().max(1.0) as usize;
    raw.min(n_rows - 1)
}

/// Seeded shuffle, then the first `test_size` rows become the test set
pub fn shuffle_split(n_rows: usize, fraction: f64, seed: u64) -> Result<SplitIndices> {
    let n_test = test_size(n_rows, fraction);
    if n_test == 0 {
        return Err(PipelineError::InsufficientRows { required: 2, actual: n_rows });
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut test = order[..n_test].to_vec();
    let mut train = order[n_test..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Ok(SplitIndices { train, test })
}

/// Split preserving class proportions. `labels` are class indices.
///
/// Each class receives the floor of its proportional share of the test set.
/// Leftover slots go to the classes with the largest fractional remainder,
/// ties to the lower class index. A class never gives up its last training
/// row, so the test set can come out smaller than `test_size` for datasets
/// dominated by singleton classes.
pub fn stratified_split(labels: &[usize], fraction: f64, seed: u64) -> Result<SplitIndices> {
    let n_rows = labels.len();
    let n_test = test_size(n_rows, fraction);

    let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &label) in labels.iter().enumerate() {
        by_class[label].push(row);
    }

    let mut alloc = vec![0usize; n_classes];
    let mut fractions = Vec::with_capacity(n_classes);
    for (class, rows) in by_class.iter().enumerate() {
        let share = rows.len() as f64 * n_test as f64 / n_rows.max(1) as f64;
        let floor = share.floor() as usize;
        alloc[class] = floor.min(rows.len().saturating_sub(1));
        fractions.push((class, share - floor as f64));
    }

    let mut remaining = n_test.saturating_sub(alloc.iter().sum());
    fractions.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    // Largest remainders first, then any class that still has room
    let order = fractions.iter().map(|&(class, _)| class).chain(0..n_classes);
    for class in order {
        if remaining == 0 {
            break;
        }
        if alloc[class] + 1 < by_class[class].len() {
            alloc[class] += 1;
            remaining -= 1;
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_rows);
    let mut test = Vec::with_capacity(n_test);
    for (class, mut rows) in by_class.into_iter().enumerate() {
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..alloc[class]]);
        train.extend_from_slice(&rows[alloc[class]..]);
    }

    if test.is_empty() || train.is_empty() {
        return Err(PipelineError::InsufficientRows { required: 2, actual: n_rows });
    }

    test.sort_unstable();
    train.sort_unstable();
    Ok(SplitIndices { train, test })
}

fn check_folds(n_rows: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(PipelineError::NotSupported(format!(
            "cross-validation needs at least 2 folds, got {}",
            n_splits
        )));
    }
    if n_rows < n_splits {
        return Err(PipelineError::InsufficientRows {
            required: n_splits,
            actual: n_rows,
        });
    }
    Ok(())
}

fn folds_from_assignment(fold_of: &[usize], n_splits: usize) -> Vec<SplitIndices> {
    (0..n_splits)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..fold_of.len()).partition(|&row| fold_of[row] == fold);
            SplitIndices { train, test }
        })
        .collect()
}

/// Seeded K-fold partition: rows are shuffled once, then cut into `n_splits`
/// contiguous folds whose sizes differ by at most one.
pub fn k_fold(n_rows: usize, n_splits: usize, seed: u64) -> Result<Vec<SplitIndices>> {
    check_folds(n_rows, n_splits)?;

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let base = n_rows / n_splits;
    let remainder = n_rows % n_splits;
    let mut fold_of = vec![0usize; n_rows];
    let mut current = 0;
    for fold in 0..n_splits {
        let size = if fold < remainder { base + 1 } else { base };
        for &row in &order[current..current + size] {
            fold_of[row] = fold;
        }
        current += size;
    }
    Ok(folds_from_assignment(&fold_of, n_splits))
}

/// K-fold partition preserving class proportions. `labels` are class indices.
///
/// Rows of each class are shuffled and dealt round-robin over the folds. The
/// deal continues from class to class, so fold sizes differ by at most one.
pub fn stratified_k_fold(labels: &[usize], n_splits: usize, seed: u64) -> Result<Vec<SplitIndices>> {
    let n_rows = labels.len();
    check_folds(n_rows, n_splits)?;

    let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &label) in labels.iter().enumerate() {
        by_class[label].push(row);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; n_rows];
    let mut dealt = 0;
    for mut rows in by_class {
        rows.shuffle(&mut rng);
        for row in rows {
            fold_of[row] = dealt % n_splits;
            dealt += 1;
        }
    }
    Ok(folds_from_assignment(&fold_of, n_splits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_rounding() {
        assert_eq!(test_size(20, 0.2), 4);
        assert_eq!(test_size(15, 0.2), 3);
        assert_eq!(test_size(11, 0.2), 3);
        assert_eq!(test_size(5, 0.2), 1);
        assert_eq!(test_size(2, 0.9), 1);
        assert_eq!(test_size(1, 0.2), 0);
    }

    #[test]
    fn test_shuffle_split_is_deterministic_partition() {
        let a = shuffle_split(50, 0.2, 42).unwrap();
        let b = shuffle_split(50, 0.2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 10);
        assert_eq!(a.train.len(), 40);

        let mut all: Vec<usize> = a.train.iter().chain(a.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_balanced() {
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 4);
        let class_one = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(class_one, 2);
    }

    #[test]
    fn test_stratified_largest_remainder() {
        // 7 of class 0, 3 of class 1; test size 2 → shares 1.4 and 0.6
        let labels = vec![0, 0, 0, 0, 0, 0, 0, 1, 1, 1];
        let split = stratified_split(&labels, 0.2, 7).unwrap();
        let per_class: Vec<usize> = (0..2)
            .map(|c| split.test.iter().filter(|&&i| labels[i] == c).count())
            .collect();
        assert_eq!(per_class, vec![1, 1]);
    }

    #[test]
    fn test_stratified_keeps_a_training_row_per_class() {
        let labels = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 2];
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        for class in 0..3 {
            assert!(split.train.iter().any(|&i| labels[i] == class));
        }
    }

    #[test]
    fn test_stratified_all_singletons_fails() {
        let labels = vec![0, 1, 2, 3, 4];
        assert!(matches!(
            stratified_split(&labels, 0.2, 42),
            Err(PipelineError::InsufficientRows { .. })
        ));
    }

    #[test]
    fn test_k_fold_covers_every_row_once() {
        let folds = k_fold(10, 3, 42).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 10);
            assert!(fold.test.iter().all(|row| !fold.train.contains(row)));
        }
        assert_eq!(folds, k_fold(10, 3, 42).unwrap());
    }

    #[test]
    fn test_stratified_k_fold_balances_classes() {
        // 6 of class 0, 3 of class 1
        let labels = [0, 0, 0, 0, 0, 0, 1, 1, 1];
        let folds = stratified_k_fold(&labels, 3, 42).unwrap();
        for fold in &folds {
            assert_eq!(fold.test.len(), 3);
            let ones = fold.test.iter().filter(|&&i| labels[i] == 1).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_fold_count_validation() {
        assert!(matches!(k_fold(10, 1, 42), Err(PipelineError::NotSupported(_))));
        assert!(matches!(
            stratified_k_fold(&[0, 1], 3, 42),
            Err(PipelineError::InsufficientRows { required: 3, actual: 2 })
        ));
    }
}
