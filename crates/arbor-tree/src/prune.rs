//! Post-order simplification of a grown tree.

use tracing::{debug, instrument};

use crate::{
    TreeError,
    catalog::ClassIndex,
    node::{Node, NodeIndex},
    record::Record,
    tree::DecisionTree,
};

/// How subtrees are judged for collapsing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PruningStrategy {
    /// Collapse when the leaf misclassifies no more held-out records than
    /// the subtree.
    #[default]
    ReducedError,
    /// Collapse when `leaf_errors - subtree_errors <= alpha * (leaves - 1)`,
    /// counting training records.
    CostComplexity {
        /// Penalty per extra leaf; must be finite and non-negative.
        alpha: f64,
    },
}

/// Where reduced-error pruning takes its held-out records from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Holdout {
    /// The contiguous tail of the training records; the tree is grown on
    /// the head.
    TrainingTail {
        /// Share of the training records held out, in (0, 1).
        fraction: f64,
    },
    /// The test records of the run.
    TestSet,
}

impl Default for Holdout {
    fn default() -> Self {
        Holdout::TrainingTail { fraction: 0.25 }
    }
}

/// Pruning settings.
///
/// # Defaults
///
/// | Parameter  | Default                              |
/// |------------|--------------------------------------|
/// | `strategy` | `ReducedError`                       |
/// | `holdout`  | `TrainingTail { fraction: 0.25 }`    |
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruningConfig {
    strategy: PruningStrategy,
    holdout: Holdout,
}

impl PruningConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pruning strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: PruningStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the hold-out source for reduced-error pruning.
    #[must_use]
    pub fn with_holdout(mut self, holdout: Holdout) -> Self {
        self.holdout = holdout;
        self
    }

    /// Return the pruning strategy.
    #[must_use]
    pub fn strategy(&self) -> PruningStrategy {
        self.strategy
    }

    /// Return the hold-out source.
    #[must_use]
    pub fn holdout(&self) -> Holdout {
        self.holdout
    }

    /// Check the fraction and alpha of this config.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::InvalidHoldoutFraction`] | a training-tail fraction outside (0, 1) |
    /// | [`TreeError::InvalidAlpha`] | a negative or non-finite cost-complexity alpha |
    pub fn validate(&self) -> Result<(), TreeError> {
        match self.strategy {
            PruningStrategy::CostComplexity { alpha } if !alpha.is_finite() || alpha < 0.0 => {
                return Err(TreeError::InvalidAlpha { alpha });
            }
            PruningStrategy::CostComplexity { .. } => {}
            PruningStrategy::ReducedError => {
                if let Holdout::TrainingTail { fraction } = self.holdout
                    && !(fraction > 0.0 && fraction < 1.0)
                {
                    return Err(TreeError::InvalidHoldoutFraction { fraction });
                }
            }
        }
        Ok(())
    }

    /// Split a run's records into `(grow_on, prune_on)`.
    ///
    /// Cost-complexity pruning grows on all of `train`. When the hold-out
    /// would be empty or would consume every training record, reduced-error
    /// pruning uses the training records themselves.
    ///
    /// # Errors
    ///
    /// See [`PruningConfig::validate`].
    pub(crate) fn select<'r>(
        &self,
        train: &'r [Record],
        test: &'r [Record],
    ) -> Result<(&'r [Record], &'r [Record]), TreeError> {
        self.validate()?;
        if let PruningStrategy::CostComplexity { .. } = self.strategy {
            return Ok((train, &train[..0]));
        }
        match self.holdout {
            Holdout::TrainingTail { fraction } => {
                let n_hold = (train.len() as f64 * fraction).floor() as usize;
                if n_hold == 0 || n_hold >= train.len() {
                    Ok((train, train))
                } else {
                    Ok(train.split_at(train.len() - n_hold))
                }
            }
            Holdout::TestSet if test.is_empty() => Ok((train, train)),
            Holdout::TestSet => Ok((train, test)),
        }
    }

    /// Prune `tree` in place and return the number of nodes removed.
    ///
    /// Subtrees are visited in post-order; a collapsed node is never
    /// expanded again. `holdout` is ignored by cost-complexity pruning.
    ///
    /// # Errors
    ///
    /// See [`PruningConfig::validate`].
    #[instrument(skip(self, tree, holdout), fields(n_nodes = tree.n_nodes(), n_holdout = holdout.len()))]
    pub fn prune(&self, tree: &mut DecisionTree, holdout: &[Record]) -> Result<usize, TreeError> {
        self.validate()?;
        let before = tree.n_nodes();
        match self.strategy {
            PruningStrategy::ReducedError => {
                let records: Vec<&Record> = holdout.iter().collect();
                let errors = reduced_error(tree, NodeIndex::new(0), &records);
                debug!(holdout_errors = errors, "reduced-error pruning finished");
            }
            PruningStrategy::CostComplexity { alpha } => {
                let (errors, leaves) = cost_complexity(tree, NodeIndex::new(0), alpha);
                debug!(training_errors = errors, leaves, "cost-complexity pruning finished");
            }
        }
        tree.compact();
        let removed = before - tree.n_nodes();
        debug!(removed, n_nodes = tree.n_nodes(), "tree pruned");
        Ok(removed)
    }
}

fn misclassified(tree: &DecisionTree, class: ClassIndex, records: &[&Record]) -> usize {
    let label = tree.classes().label(class);
    records
        .iter()
        .filter(|r| r.class(tree.target()) != Some(label))
        .count()
}

/// Returns the held-out errors of the (possibly collapsed) subtree at `idx`.
fn reduced_error(tree: &mut DecisionTree, idx: NodeIndex, records: &[&Record]) -> usize {
    let node = tree.node(idx);
    let prediction = node.prediction();
    let leaf_errors = misclassified(tree, prediction, records);
    let Node::Split { attribute, test, .. } = node else {
        return leaf_errors;
    };

    let children = test.children();
    let mut parts: Vec<Vec<&Record>> = vec![Vec::new(); children.len()];
    let mut stopped: Vec<&Record> = Vec::new();
    for &record in records {
        match tree
            .route(*attribute, test, record)
            .and_then(|next| children.iter().position(|&c| c == next))
        {
            Some(branch) => parts[branch].push(record),
            None => stopped.push(record),
        }
    }

    let mut subtree_errors = misclassified(tree, prediction, &stopped);
    for (child, part) in children.into_iter().zip(parts) {
        subtree_errors += reduced_error(tree, child, &part);
    }

    if leaf_errors <= subtree_errors {
        tree.nodes[idx.index()].collapse();
        leaf_errors
    } else {
        subtree_errors
    }
}

/// Returns `(training errors, leaves)` of the subtree at `idx`.
fn cost_complexity(tree: &mut DecisionTree, idx: NodeIndex, alpha: f64) -> (usize, usize) {
    let node = tree.node(idx);
    let leaf_errors = node.stats().errors();
    let children = node.children();
    if children.is_empty() {
        return (leaf_errors, 1);
    }

    let (mut errors, mut leaves) = (0usize, 0usize);
    for child in children {
        let (e, l) = cost_complexity(tree, child, alpha);
        errors += e;
        leaves += l;
    }

    if leaf_errors as f64 - errors as f64 <= alpha * (leaves as f64 - 1.0) {
        tree.nodes[idx.index()].collapse();
        (leaf_errors, 1)
    } else {
        (errors, leaves)
    }
}
