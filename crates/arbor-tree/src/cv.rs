//! Contiguous k-fold cross-validation.

use std::ops::Range;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::catalog::AttributeCatalog;
use crate::confusion::ConfusionMatrix;
use crate::error::TreeError;
use crate::record::Record;
use crate::tree::TreeConfig;

/// Cross-validation configuration.
///
/// # Defaults
///
/// | Parameter      | Default                    |
/// |----------------|----------------------------|
/// | `shuffle_seed` | `None` (original order)    |
/// | `parallel`     | `false`                    |
#[derive(Debug, Clone)]
pub struct CrossValidation {
    n_folds: usize,
    shuffle_seed: Option<u64>,
    parallel: bool,
}

/// Metrics of a single fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldResult {
    /// Zero-based fold number.
    pub fold: usize,
    /// Number of training records.
    pub n_train: usize,
    /// Number of test records.
    pub n_test: usize,
    /// Accuracy on the test block.
    pub accuracy: f64,
    /// Matthews correlation coefficient on the test block.
    pub mcc: f64,
    /// Time to grow and prune the fold's tree, in milliseconds.
    pub build_duration_ms: f64,
}

/// Results of k-fold cross-validation.
#[derive(Debug, Clone)]
pub struct CrossValidationResult {
    /// Per-fold metrics in fold order.
    pub folds: Vec<FoldResult>,
    /// Mean accuracy across folds.
    pub mean_accuracy: f64,
    /// Population standard deviation of fold accuracies.
    pub std_accuracy: f64,
    /// Mean MCC across folds.
    pub mean_mcc: f64,
    /// Mean build duration across folds, in milliseconds.
    pub mean_build_duration_ms: f64,
    /// Confusion matrix of the last fold.
    pub confusion_matrix: ConfusionMatrix,
    /// Pooled-record indices of each fold's test block.
    pub test_indices: Vec<Vec<usize>>,
}

impl CrossValidation {
    /// Create a cross-validation config with `n_folds` folds.
    ///
    /// The count is checked against the pooled size in
    /// [`CrossValidation::evaluate`].
    #[must_use]
    pub fn new(n_folds: usize) -> Self {
        Self {
            n_folds,
            shuffle_seed: None,
            parallel: false,
        }
    }

    /// Permute the pooled records with this seed before blocking.
    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// Run folds on the rayon thread pool.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Return the fold count.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the shuffle seed, if any.
    #[must_use]
    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle_seed
    }

    /// Return `true` if folds run in parallel.
    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Contiguous block bounds over `n_records` positions.
    ///
    /// Blocks differ in size by at most one; the first `n mod k` are larger.
    #[must_use]
    pub fn fold_ranges(&self, n_records: usize) -> Vec<Range<usize>> {
        let k = self.n_folds.max(1);
        let base = n_records / k;
        let extra = n_records % k;
        (0..k)
            .map(|f| {
                let start = f * base + f.min(extra);
                let len = base + usize::from(f < extra);
                start..start + len
            })
            .collect()
    }

    /// Cross-validate `config` over `pooled` predicting `target`.
    ///
    /// Each block is the test set of one fold and the remaining blocks,
    /// concatenated in order, are its training set. With one fold the whole
    /// pool is used for both. Any fold error aborts the run.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::InvalidFoldCount`] | `n_folds` is 0 or exceeds `pooled.len()` |
    /// | [`TreeError::UnknownTarget`] | no pooled record carries `target` |
    /// | [`TreeError::MissingTargetValue`] | a pooled record lacks `target` |
    /// | [`TreeError::InvalidHoldoutFraction`], [`TreeError::InvalidAlpha`] | invalid pruning config |
    /// | Other tree errors | from any fold |
    #[instrument(skip_all, fields(n_folds = self.n_folds, n_records = pooled.len()))]
    pub fn evaluate(
        &self,
        config: &TreeConfig,
        pooled: &[Record],
        target: &str,
    ) -> Result<CrossValidationResult, TreeError> {
        let n = pooled.len();
        if self.n_folds == 0 || self.n_folds > n {
            return Err(TreeError::InvalidFoldCount {
                n_folds: self.n_folds,
                n_records: n,
            });
        }
        AttributeCatalog::build(pooled, target)?;
        if let Some(pruning) = config.pruning() {
            pruning.validate()?;
        }

        let mut order: Vec<usize> = (0..n).collect();
        if let Some(seed) = self.shuffle_seed {
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }
        let ranges = self.fold_ranges(n);
        let test_indices: Vec<Vec<usize>> =
            ranges.iter().map(|range| order[range.clone()].to_vec()).collect();

        let run = |fold: usize| run_fold(fold, config, pooled, &order, &ranges, target);
        let outcomes: Vec<(FoldResult, ConfusionMatrix)> = if self.parallel {
            (0..self.n_folds)
                .into_par_iter()
                .map(run)
                .collect::<Result<_, _>>()?
        } else {
            (0..self.n_folds).map(run).collect::<Result<_, _>>()?
        };

        let k = outcomes.len() as f64;
        let mut folds = Vec::with_capacity(outcomes.len());
        let mut confusion_matrix = ConfusionMatrix::from_pairs(std::iter::empty());
        for (fold, confusion) in outcomes {
            folds.push(fold);
            confusion_matrix = confusion;
        }

        let mean_accuracy = folds.iter().map(|f| f.accuracy).sum::<f64>() / k;
        let std_accuracy = (folds
            .iter()
            .map(|f| (f.accuracy - mean_accuracy).powi(2))
            .sum::<f64>()
            / k)
            .sqrt();
        let mean_mcc = folds.iter().map(|f| f.mcc).sum::<f64>() / k;
        let mean_build_duration_ms = folds.iter().map(|f| f.build_duration_ms).sum::<f64>() / k;

        info!(
            mean_accuracy,
            std_accuracy,
            mean_mcc,
            "cross-validation complete"
        );

        Ok(CrossValidationResult {
            folds,
            mean_accuracy,
            std_accuracy,
            mean_mcc,
            mean_build_duration_ms,
            confusion_matrix,
            test_indices,
        })
    }
}

/// Indices outside the held-out block, in `order`.
fn train_order(order: &[usize], held: Range<usize>) -> impl Iterator<Item = usize> + '_ {
    order[..held.start].iter().chain(&order[held.end..]).copied()
}

fn run_fold(
    fold: usize,
    config: &TreeConfig,
    pooled: &[Record],
    order: &[usize],
    ranges: &[Range<usize>],
    target: &str,
) -> Result<(FoldResult, ConfusionMatrix), TreeError> {
    let range = ranges[fold].clone();
    let test: Vec<Record> = order[range.clone()].iter().map(|&i| pooled[i].clone()).collect();
    let train: Vec<Record> = if ranges.len() == 1 {
        test.clone()
    } else {
        train_order(order, range).map(|i| pooled[i].clone()).collect()
    };

    let trained = config.train(&train, &test, target)?;
    let evaluation = trained.tree.evaluate(&test)?;
    let result = FoldResult {
        fold,
        n_train: train.len(),
        n_test: test.len(),
        accuracy: evaluation.accuracy(),
        mcc: evaluation.mcc(),
        build_duration_ms: trained.build_duration.as_secs_f64() * 1000.0,
    };
    info!(
        fold,
        accuracy = result.accuracy,
        mcc = result.mcc,
        pruned_nodes = trained.pruned_nodes,
        "fold completed"
    );
    Ok((result, evaluation.confusion().clone()))
}
