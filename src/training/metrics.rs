//! Evaluation metrics and the training result

use ndarray::Array1;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::models::{ModelKind, TaskKind};

/// Precision, recall and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl Serialize for ClassScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("precision", &self.precision)?;
        map.serialize_entry("recall", &self.recall)?;
        map.serialize_entry("f1-score", &self.f1)?;
        map.serialize_entry("support", &self.support)?;
        map.end()
    }
}

/// Per-class report with macro and support-weighted averages
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Per-class scores in label order
    pub classes: Vec<(String, ClassScores)>,
    pub accuracy: f64,
    /// Unweighted mean over classes
    pub macro_avg: ClassScores,
    /// Mean weighted by class support
    pub weighted_avg: ClassScores,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Build the report from class indices. `labels[i]` names class `i`.
    /// Zero divisions score 0.
    pub fn compute(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> Self {
        let k = labels.len();
        let mut true_pos = vec![0usize; k];
        let mut predicted = vec![0usize; k];
        let mut actual = vec![0usize; k];

        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < k {
                actual[t] += 1;
            }
            if p < k {
                predicted[p] += 1;
            }
            if t == p && t < k {
                true_pos[t] += 1;
            }
        }

        let classes: Vec<(String, ClassScores)> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let precision = ratio(true_pos[i], predicted[i]);
                let recall = ratio(true_pos[i], actual[i]);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                (
                    label.clone(),
                    ClassScores {
                        precision,
                        recall,
                        f1,
                        support: actual[i],
                    },
                )
            })
            .collect();

        let total = y_true.len();
        let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();

        let mut macro_avg = ClassScores {
            support: total,
            ..Default::default()
        };
        let mut weighted_avg = macro_avg;
        for (_, scores) in &classes {
            macro_avg.precision += scores.precision / k.max(1) as f64;
            macro_avg.recall += scores.recall / k.max(1) as f64;
            macro_avg.f1 += scores.f1 / k.max(1) as f64;

            let w = ratio(scores.support, total);
            weighted_avg.precision += scores.precision * w;
            weighted_avg.recall += scores.recall * w;
            weighted_avg.f1 += scores.f1 * w;
        }

        Self {
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
        }
    }
}

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len() + 3))?;
        for (label, scores) in &self.classes {
            map.serialize_entry(label, scores)?;
        }
        map.serialize_entry("accuracy", &self.accuracy)?;
        map.serialize_entry("macro avg", &self.macro_avg)?;
        map.serialize_entry("weighted avg", &self.weighted_avg)?;
        map.end()
    }
}

/// Mean squared error
pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    (y_true - y_pred).mapv(|d| d * d).sum() / y_true.len() as f64
}

/// Coefficient of determination. A constant target scores 1 when predicted
/// exactly and 0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = (y_true - y_pred).mapv(|d| d * d).sum();
    let ss_tot: f64 = y_true.mapv(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Fraction of positions where the predicted class matches
pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ratio(correct, y_true.len())
}

/// Scores of a fitted model on rows outside its training data. Classification
/// scores are support-weighted averages over the classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvaluationScores {
    Classification {
        accuracy: f64,
        precision: f64,
        recall: f64,
        f1_score: f64,
        support: usize,
    },
    Regression {
        mse: f64,
        r2_score: f64,
        support: usize,
    },
}

impl EvaluationScores {
    pub fn classification(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> Self {
        let report = ClassificationReport::compute(y_true, y_pred, labels);
        EvaluationScores::Classification {
            accuracy: report.accuracy,
            precision: report.weighted_avg.precision,
            recall: report.weighted_avg.recall,
            f1_score: report.weighted_avg.f1,
            support: y_true.len(),
        }
    }

    pub fn regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        EvaluationScores::Regression {
            mse: mean_squared_error(y_true, y_pred),
            r2_score: r2_score(y_true, y_pred),
            support: y_true.len(),
        }
    }
}

/// Task-specific scores
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Scores {
    Classification {
        accuracy: f64,
        classification_report: ClassificationReport,
    },
    Regression {
        mse: f64,
        r2_score: f64,
    },
}

/// Provenance of a training run
#[derive(Debug, Clone, Serialize)]
pub struct ResultMeta {
    pub task: TaskKind,
    pub target: String,
    /// Rows used for fitting
    pub train_size: usize,
    /// Rows held out for scoring
    pub test_size: usize,
    /// Width of the feature matrix after one-hot expansion
    pub n_features: usize,
    /// Distinct class labels, sorted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    /// `[min, max]` of the usable target values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_range: Option<[f64; 2]>,
}

/// Outcome of one `train` call
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub model: ModelKind,
    #[serde(flatten)]
    pub scores: Scores,
    /// Split sizes and target details
    pub meta: ResultMeta,
}

impl ModelResult {
    pub fn accuracy(&self) -> Option<f64> {
        match &self.scores {
            Scores::Classification { accuracy, .. } => Some(*accuracy),
            Scores::Regression { .. } => None,
        }
    }

    pub fn mse(&self) -> Option<f64> {
        match &self.scores {
            Scores::Regression { mse, .. } => Some(*mse),
            Scores::Classification { .. } => None,
        }
    }

    pub fn r2(&self) -> Option<f64> {
        match &self.scores {
            Scores::Regression { r2_score, .. } => Some(*r2_score),
            Scores::Classification { .. } => None,
        }
    }

    pub fn report(&self) -> Option<&ClassificationReport> {
        match &self.scores {
            Scores::Classification {
                classification_report, ..
            } => Some(classification_report),
            Scores::Regression { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classification_report() {
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        let report = ClassificationReport::compute(&y_true, &y_pred, &labels(&["a", "b"]));

        assert!((report.accuracy - 0.75).abs() < 1e-12);
        let (_, a) = &report.classes[0];
        assert!((a.precision - 1.0).abs() < 1e-12);
        assert!((a.recall - 0.5).abs() < 1e-12);
        let (_, b) = &report.classes[1];
        assert!((b.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(b.support, 2);
        assert_eq!(report.macro_avg.support, 4);
    }

    #[test]
    fn test_zero_division_scores_zero() {
        let report = ClassificationReport::compute(&[0, 0], &[0, 0], &labels(&["a", "b"]));
        let (_, b) = &report.classes[1];
        assert_eq!(b.precision, 0.0);
        assert_eq!(b.recall, 0.0);
        assert_eq!(b.f1, 0.0);
    }

    #[test]
    fn test_report_json_layout() {
        let report = ClassificationReport::compute(&[0, 1], &[0, 1], &labels(&["no", "yes"]));
        let json = serde_json::to_value(&report).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["no", "yes", "accuracy", "macro avg", "weighted avg"]);
        assert_eq!(json["yes"]["f1-score"], 1.0);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        assert!((mean_squared_error(&y_true, &y_pred) - 0.006).abs() < 1e-9);
        assert!(r2_score(&y_true, &y_pred) > 0.99);
        assert_eq!(r2_score(&array![2.0, 2.0], &array![2.0, 2.0]), 1.0);
    }

    #[test]
    fn test_result_flattens_scores() {
        let result = ModelResult {
            model: ModelKind::LinearRegression,
            scores: Scores::Regression { mse: 0.5, r2_score: 0.9 },
            meta: ResultMeta {
                task: TaskKind::Regression,
                target: "y".into(),
                train_size: 8,
                test_size: 2,
                n_features: 1,
                classes: None,
                target_range: Some([0.0, 1.0]),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["model"], "LinearRegression");
        assert_eq!(json["mse"], 0.5);
        assert_eq!(json["r2_score"], 0.9);
        assert_eq!(json["meta"]["test_size"], 2);
        assert!(json["meta"].get("classes").is_none());
    }

    #[test]
    fn test_weighted_evaluation_scores() {
        let y_true = [0, 0, 0, 1];
        let y_pred = [0, 0, 1, 1];
        let scores = EvaluationScores::classification(&y_true, &y_pred, &labels(&["a", "b"]));
        match scores {
            EvaluationScores::Classification {
                accuracy,
                precision,
                recall,
                support,
                ..
            } => {
                assert!((accuracy - 0.75).abs() < 1e-12);
                // a: p=1, r=2/3 (support 3); b: p=0.5, r=1 (support 1)
                assert!((precision - (3.0 * 1.0 + 0.5) / 4.0).abs() < 1e-12);
                assert!((recall - 0.75).abs() < 1e-12);
                assert_eq!(support, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!((accuracy_score(&y_true, &y_pred) - 0.75).abs() < 1e-12);
    }
}
