//! Domain types for arbor-io.
//!
//! The summary rows are plain data: the CLI copies them out of arbor-tree
//! results so this crate never depends on the tree engine.

use serde::Serialize;

use crate::IoError;

/// Prefix of every artifact a run writes, restricted to `[a-zA-Z0-9_-]+`
/// so it can never escape the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Validate `name`.
    ///
    /// # Errors
    ///
    /// [`IoError::InvalidExperimentName`] when `name` is empty or holds any
    /// character other than ASCII letters, digits, `_` and `-`.
    pub fn new(name: String) -> Result<Self, IoError> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-');
        if name.is_empty() || !name.chars().all(allowed) {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ExperimentName {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-class precision, recall and F1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetricsEntry {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// One train/test run: tree shape, timings and test-set metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub criterion: String,
    pub max_depth: String,
    /// Pruning strategy, `None` when the tree was not pruned.
    pub pruning: Option<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub n_nodes: usize,
    pub n_leaves: usize,
    pub depth: usize,
    pub pruned_nodes: usize,
    pub build_ms: f64,
    pub evaluate_ms: f64,
    pub accuracy: f64,
    pub mcc: f64,
    /// Test records classified by a node's majority class because no branch matched.
    pub fallbacks: usize,
    /// Row and column labels of `confusion_matrix`.
    pub labels: Vec<String>,
    /// `confusion_matrix[actual][predicted]`.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub class_metrics: Vec<ClassMetricsEntry>,
}

/// Metrics of a single cross-validation fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldEntry {
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub accuracy: f64,
    pub mcc: f64,
    pub build_ms: f64,
}

/// Aggregate of a k-fold cross-validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvSummary {
    pub target: String,
    pub criterion: String,
    pub n_folds: usize,
    pub n_records: usize,
    pub shuffle_seed: Option<u64>,
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    pub mean_mcc: f64,
    pub mean_build_ms: f64,
    pub folds: Vec<FoldEntry>,
    /// Labels of the last fold's confusion matrix.
    pub labels: Vec<String>,
    pub confusion_matrix: Vec<Vec<usize>>,
}

/// One ranked row of the feature-importance table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceEntry {
    pub rank: usize,
    pub attribute: String,
    pub cumulative_gain: f64,
    pub share: f64,
    pub n_splits: usize,
}

/// One node of an exported tree, in pre-order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNodeEntry {
    pub id: usize,
    pub parent: Option<usize>,
    /// Tested attribute for a split, predicted class for a leaf.
    pub label: String,
    /// Condition on the edge from the parent.
    pub predicate: Option<String>,
    pub depth: usize,
    pub is_leaf: bool,
    pub class: String,
    pub n_samples: usize,
}
