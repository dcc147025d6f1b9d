//! Confusion matrix over class labels and the metrics derived from it.

use std::collections::BTreeSet;
use std::fmt;

/// A confusion matrix for multi-class classification.
///
/// Labels are the sorted union of actual and predicted labels. Entry
/// `counts[actual][predicted]` counts the records with that pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Vec<Vec<usize>>,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassMetrics {
    /// The class label.
    pub label: String,
    /// Precision: TP / (TP + FP). 0.0 if nothing was predicted as this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no record is of this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of records of this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a matrix from `(actual, predicted)` label pairs.
    ///
    /// An empty input gives an empty matrix with accuracy and MCC of 0.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        let labels: Vec<String> = pairs
            .iter()
            .flat_map(|&(a, p)| [a, p])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect();
        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (actual, predicted) in pairs {
            let (Some(a), Some(p)) = (position(&labels, actual), position(&labels, predicted))
            else {
                continue;
            };
            counts[a][p] += 1;
        }
        Self { labels, counts }
    }

    /// Return the labels in row/column order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Return the underlying matrix rows (actual class).
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    /// Return the count for an `(actual, predicted)` pair; 0 for unknown labels.
    #[must_use]
    pub fn count(&self, actual: &str, predicted: &str) -> usize {
        match (position(&self.labels, actual), position(&self.labels, predicted)) {
            (Some(a), Some(p)) => self.counts[a][p],
            _ => 0,
        }
    }

    /// Return the number of records counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Return the number of correct predictions (the trace).
    #[must_use]
    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Overall accuracy: trace divided by total; 0.0 when empty.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Multi-class Matthews correlation coefficient.
    ///
    /// `(c·s - Σ p_k·t_k) / sqrt((s² - Σ p_k²)·(s² - Σ t_k²))` with `c` the
    /// correct count, `s` the total and `p_k`/`t_k` the predicted/actual
    /// marginals. Defined as 0 when either factor under the root is 0.
    #[must_use]
    pub fn mcc(&self) -> f64 {
        let n = self.labels.len();
        let s = self.total() as f64;
        let c = self.correct() as f64;
        let t: Vec<f64> = (0..n)
            .map(|k| self.counts[k].iter().sum::<usize>() as f64)
            .collect();
        let p: Vec<f64> = (0..n)
            .map(|k| self.counts.iter().map(|row| row[k]).sum::<usize>() as f64)
            .collect();

        let numerator = c * s - p.iter().zip(&t).map(|(pk, tk)| pk * tk).sum::<f64>();
        let pred_factor = s * s - p.iter().map(|pk| pk * pk).sum::<f64>();
        let true_factor = s * s - t.iter().map(|tk| tk * tk).sum::<f64>();
        if pred_factor <= 0.0 || true_factor <= 0.0 {
            return 0.0;
        }
        (numerator / (pred_factor.sqrt() * true_factor.sqrt())).clamp(-1.0, 1.0)
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.labels.len();
        (0..n)
            .map(|c| {
                let tp = self.counts[c][c];
                let fp: usize = (0..n).filter(|&i| i != c).map(|i| self.counts[i][c]).sum();
                let fn_: usize = (0..n).filter(|&j| j != c).map(|j| self.counts[c][j]).sum();
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    label: self.labels[c].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }
}

fn position(labels: &[String], label: &str) -> Option<usize> {
    labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain([8])
            .max()
            .unwrap_or(8);

        write!(f, "{:>width$}", "actual")?;
        for label in &self.labels {
            write!(f, " {label:>width$}")?;
        }
        writeln!(f)?;

        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{label:>width$}")?;
            for val in row {
                write!(f, " {val:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(actual: &[&str], predicted: &[&str]) -> ConfusionMatrix {
        ConfusionMatrix::from_pairs(actual.iter().copied().zip(predicted.iter().copied()))
    }

    #[test]
    fn perfect_predictions() {
        let cm = matrix(&["a", "a", "b", "c"], &["a", "a", "b", "c"]);
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
        assert!((cm.mcc() - 1.0).abs() < 1e-10);
        for m in cm.class_metrics() {
            assert!((m.f1 - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn known_confusion_matrix() {
        let actual = ["0", "0", "0", "1", "1", "1", "2", "2", "2"];
        let predicted = ["0", "0", "1", "1", "1", "2", "2", "2", "0"];
        let cm = matrix(&actual, &predicted);
        let metrics = cm.class_metrics();
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(metrics[0].support, 3);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-10);
        // c=6, s=9, p=t=(3,3,3): (54-27) / (81-27) = 0.5
        assert!((cm.mcc() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn binary_mcc_matches_two_class_formula() {
        // tp=3 fn=1 fp=1 tn=3: (9-1)/sqrt(4*4*4*4) = 0.5
        let actual = ["p", "p", "p", "p", "n", "n", "n", "n"];
        let predicted = ["p", "p", "p", "n", "p", "n", "n", "n"];
        assert!((matrix(&actual, &predicted).mcc() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn inverted_predictions_give_negative_mcc() {
        let cm = matrix(&["a", "b", "a", "b"], &["b", "a", "b", "a"]);
        assert!((cm.mcc() + 1.0).abs() < 1e-10);
        assert!((cm.accuracy() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn constant_prediction_mcc_is_zero() {
        let cm = matrix(&["a", "b", "b"], &["b", "b", "b"]);
        assert!((cm.mcc() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn labels_are_union_of_actual_and_predicted() {
        let cm = matrix(&["b", "b"], &["a", "b"]);
        assert_eq!(cm.labels(), &["a".to_string(), "b".to_string()]);
        assert_eq!(cm.count("b", "a"), 1);
        assert_eq!(cm.count("b", "b"), 1);
        assert_eq!(cm.count("z", "a"), 0);
        assert_eq!(cm.as_rows(), &[vec![0, 0], vec![1, 1]]);
    }

    #[test]
    fn empty_matrix() {
        let cm = ConfusionMatrix::from_pairs(std::iter::empty());
        assert_eq!(cm.total(), 0);
        assert!((cm.accuracy() - 0.0).abs() < f64::EPSILON);
        assert!((cm.mcc() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_renders_rows_as_actual() {
        let cm = matrix(&["yes", "no"], &["yes", "yes"]);
        let output = format!("{cm}");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("actual"));
        assert!(lines[1].trim_start().starts_with("no"));
    }
}
