use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::{
    TreeError,
    catalog::{AttributeCatalog, AttributeIndex, AttributeKind, ClassIndex, ClassSet},
    node::{Node, NodeIndex, NodeStats, SplitTest},
    prune::PruningConfig,
    record::Record,
    split::{CandidateTest, MIN_SCORE, SplitCriterion, TrainingTable, find_best_split},
};

/// Depth bound of a tree; the root is at depth 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum MaxDepth {
    /// Grow until leaves are pure or no split helps.
    #[default]
    Unlimited,
    /// Nodes at this depth become leaves. `Bounded(0)` is a single root leaf.
    Bounded(usize),
}

/// How a legacy max-depth of `0` is read by [`MaxDepth::from_legacy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroDepth {
    /// `0` means no bound.
    Unlimited,
    /// `0` means the tree is a single root leaf.
    RootOnly,
}

impl MaxDepth {
    /// Return `true` when a node at `depth` must be a leaf.
    #[must_use]
    pub fn reached(self, depth: usize) -> bool {
        match self {
            MaxDepth::Unlimited => false,
            MaxDepth::Bounded(max) => depth >= max,
        }
    }

    /// Parse a string-encoded depth, choosing explicitly what `0` means.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidMaxDepth`] when `raw` is neither
    /// `unlimited`/`none` nor a non-negative integer.
    pub fn from_legacy(raw: &str, zero: ZeroDepth) -> Result<Self, TreeError> {
        match raw.parse::<MaxDepth>()? {
            MaxDepth::Bounded(0) if zero == ZeroDepth::Unlimited => Ok(MaxDepth::Unlimited),
            depth => Ok(depth),
        }
    }
}

impl FromStr for MaxDepth {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") || trimmed.eq_ignore_ascii_case("none") {
            return Ok(MaxDepth::Unlimited);
        }
        trimmed
            .parse::<usize>()
            .map(MaxDepth::Bounded)
            .map_err(|_| TreeError::InvalidMaxDepth { raw: s.to_string() })
    }
}

impl fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxDepth::Unlimited => f.write_str("unlimited"),
            MaxDepth::Bounded(n) => write!(f, "{n}"),
        }
    }
}

/// Rule for choosing between classes with equal counts at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TieBreak {
    /// Lexicographically smallest label wins.
    #[default]
    Lexicographic,
    /// Label seen first in the training records wins.
    FirstSeen,
}

impl TieBreak {
    /// Return the majority class of `class_counts` under this rule.
    #[must_use]
    pub fn majority(self, class_counts: &[usize], classes: &ClassSet) -> ClassIndex {
        let mut best = 0usize;
        for (c, &count) in class_counts.iter().enumerate().skip(1) {
            let wins = match count.cmp(&class_counts[best]) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => match self {
                    TieBreak::Lexicographic => false,
                    TieBreak::FirstSeen => {
                        classes.first_seen_rank(ClassIndex::new(c))
                            < classes.first_seen_rank(ClassIndex::new(best))
                    }
                },
            };
            if wins {
                best = c;
            }
        }
        ClassIndex::new(best)
    }
}

impl FromStr for TieBreak {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicographic" | "lex" => Ok(TieBreak::Lexicographic),
            "first-seen" | "firstseen" | "first" => Ok(TieBreak::FirstSeen),
            _ => Err(TreeError::UnknownTieBreak { name: s.to_string() }),
        }
    }
}

/// Configuration for inducing a single decision tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter   | Default            |
/// |-------------|--------------------|
/// | `criterion` | `InfoGain`         |
/// | `max_depth` | `Unlimited`        |
/// | `tie_break` | `Lexicographic`    |
/// | `pruning`   | `None` (disabled)  |
/// | `deadline`  | `None` (no limit)  |
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_depth: MaxDepth,
    pub(crate) tie_break: TieBreak,
    pub(crate) pruning: Option<PruningConfig>,
    pub(crate) deadline: Option<Duration>,
}

/// A tree produced by [`TreeConfig::train`].
#[derive(Debug, Clone)]
pub struct Trained {
    /// The grown and, if configured, pruned tree.
    pub tree: DecisionTree,
    /// Nodes removed by pruning.
    pub pruned_nodes: usize,
    /// Wall time for growing and pruning.
    pub build_duration: Duration,
}

impl TreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::InfoGain,
            max_depth: MaxDepth::Unlimited,
            tie_break: TieBreak::Lexicographic,
            pruning: None,
            deadline: None,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum tree depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: MaxDepth) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the majority-class tie-break rule.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Enable pruning in [`TreeConfig::train`]; `None` disables it.
    #[must_use]
    pub fn with_pruning(mut self, pruning: Option<PruningConfig>) -> Self {
        self.pruning = pruning;
        self
    }

    /// Abort construction with [`TreeError::DeadlineExceeded`] after `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    // --- Getters ---

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the depth bound.
    #[must_use]
    pub fn max_depth(&self) -> MaxDepth {
        self.max_depth
    }

    /// Return the tie-break rule.
    #[must_use]
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Return the pruning configuration, if pruning is enabled.
    #[must_use]
    pub fn pruning(&self) -> Option<&PruningConfig> {
        self.pruning.as_ref()
    }

    /// Return the construction deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Grow an unpruned tree on `records` predicting `target`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`TreeError::EmptyTrainingSet`] | `records` is empty |
    /// | [`TreeError::UnknownTarget`] | no record carries `target` |
    /// | [`TreeError::MissingTargetValue`] | a record lacks `target` |
    /// | [`TreeError::DeadlineExceeded`] | the deadline passed during growth |
    #[instrument(skip(self, records), fields(n_records = records.len(), criterion = %self.criterion))]
    pub fn fit(&self, records: &[Record], target: &str) -> Result<DecisionTree, TreeError> {
        if records.is_empty() {
            return Err(TreeError::EmptyTrainingSet);
        }
        let catalog = AttributeCatalog::build(records, target)?;
        let table = TrainingTable::build(records, &catalog);

        let mut grower = Grower {
            table: &table,
            catalog: &catalog,
            config: self,
            arena: Vec::new(),
            started: Instant::now(),
        };
        let sample_indices: Vec<usize> = (0..records.len()).collect();
        let active: Vec<bool> = vec![true; catalog.len()];
        let root = grower.grow(&sample_indices, 0, &active)?;
        let nodes = grower.arena;

        debug!(
            root_index = root.index(),
            n_nodes = nodes.len(),
            n_attributes = catalog.len(),
            "decision tree built"
        );

        Ok(DecisionTree {
            nodes,
            catalog,
            criterion: self.criterion,
        })
    }

    /// Grow a tree and prune it if pruning is configured.
    ///
    /// The hold-out records for pruning are chosen from `train` and `test`
    /// according to [`PruningConfig::holdout`].
    ///
    /// # Errors
    ///
    /// See [`TreeConfig::fit`] and [`PruningConfig::prune`]; additionally
    /// [`TreeError::InvalidHoldoutFraction`] for a bad training-tail fraction.
    pub fn train(
        &self,
        train: &[Record],
        test: &[Record],
        target: &str,
    ) -> Result<Trained, TreeError> {
        let started = Instant::now();
        let Some(pruning) = &self.pruning else {
            let tree = self.fit(train, target)?;
            return Ok(Trained {
                tree,
                pruned_nodes: 0,
                build_duration: started.elapsed(),
            });
        };
        let (grow_on, prune_on) = pruning.select(train, test)?;
        let mut tree = self.fit(grow_on, target)?;
        let pruned_nodes = pruning.prune(&mut tree, prune_on)?;
        Ok(Trained {
            tree,
            pruned_nodes,
            build_duration: started.elapsed(),
        })
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct Grower<'a> {
    table: &'a TrainingTable,
    catalog: &'a AttributeCatalog,
    config: &'a TreeConfig,
    arena: Vec<Node>,
    started: Instant,
}

impl Grower<'_> {
    fn push(&mut self, node: Node) -> NodeIndex {
        let idx = self.arena.len();
        self.arena.push(node);
        NodeIndex::new(idx)
    }

    fn check_deadline(&self) -> Result<(), TreeError> {
        if let Some(budget) = self.config.deadline {
            let elapsed = self.started.elapsed();
            if elapsed >= budget {
                return Err(TreeError::DeadlineExceeded {
                    budget_ms: budget.as_millis(),
                    elapsed_ms: elapsed.as_millis(),
                });
            }
        }
        Ok(())
    }

    /// Build the subtree for `sample_indices` and return its root.
    fn grow(
        &mut self,
        sample_indices: &[usize],
        depth: usize,
        active: &[bool],
    ) -> Result<NodeIndex, TreeError> {
        self.check_deadline()?;

        let class_counts = self.table.class_counts(sample_indices);
        let stats = NodeStats {
            impurity: self.config.criterion.impurity(&class_counts),
            prediction: self
                .config
                .tie_break
                .majority(&class_counts, self.catalog.classes()),
            n_samples: sample_indices.len(),
            class_counts,
        };

        let pure = stats.class_counts.iter().filter(|&&c| c > 0).count() <= 1;
        let exhausted = !active.iter().any(|&a| a);
        if pure || exhausted || self.config.max_depth.reached(depth) {
            return Ok(self.push(Node::Leaf { stats }));
        }

        let split = find_best_split(self.table, sample_indices, active, &self.config.criterion)
            .filter(|s| s.score > MIN_SCORE);
        let Some(split) = split else {
            return Ok(self.push(Node::Leaf { stats }));
        };

        // Reserve the slot so the subtree is laid out in pre-order.
        let node_idx = self.push(Node::Leaf {
            stats: stats.clone(),
        });

        let catalog = self.catalog;
        let attribute = catalog.attribute(split.attribute);
        let mut child_active = active.to_vec();
        if attribute.kind() == AttributeKind::Categorical {
            child_active[split.attribute.index()] = false;
        }

        let mut children = Vec::with_capacity(split.partitions.len());
        for partition in &split.partitions {
            children.push(self.grow(partition, depth + 1, &child_active)?);
        }

        let test = match &split.test {
            CandidateTest::Threshold(threshold) => SplitTest::Threshold {
                threshold: *threshold,
                left: children[0],
                right: children[1],
            },
            CandidateTest::Categories(codes) => SplitTest::Categories {
                branches: codes
                    .iter()
                    .zip(children)
                    .map(|(&code, child)| {
                        (attribute.category(code).unwrap_or_default().to_string(), child)
                    })
                    .collect(),
            },
        };

        self.arena[node_idx.index()] = Node::Split {
            attribute: split.attribute,
            test,
            score: split.score,
            gain: split.gain,
            stats,
        };
        Ok(node_idx)
    }
}

/// Outcome of routing one record through a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    /// Predicted class.
    pub class: ClassIndex,
    /// Node whose majority class was used.
    pub node: NodeIndex,
    /// `true` when routing stopped at a split node because the record's
    /// value matched no branch.
    pub fallback: bool,
}

/// A fitted decision tree.
///
/// Stored as an arena `Vec<Node>` with the root at index 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) catalog: AttributeCatalog,
    pub(crate) criterion: SplitCriterion,
}

impl DecisionTree {
    /// Route `record` from the root to a leaf.
    ///
    /// A threshold test routes by `<=` / `>`; a categorical test by exact
    /// match. A missing value, a non-numeric value under a threshold test,
    /// or an unseen category stops at that node and uses its majority
    /// class.
    #[must_use]
    pub fn predict(&self, record: &Record) -> Prediction {
        let mut idx = NodeIndex::new(0);
        loop {
            let node = &self.nodes[idx.index()];
            let Node::Split {
                attribute, test, ..
            } = node
            else {
                return Prediction {
                    class: node.prediction(),
                    node: idx,
                    fallback: false,
                };
            };
            let next = self.route(*attribute, test, record);
            match next {
                Some(child) => idx = child,
                None => {
                    return Prediction {
                        class: node.prediction(),
                        node: idx,
                        fallback: true,
                    };
                }
            }
        }
    }

    /// Return the child `record` is routed to at a split, if any branch matches.
    pub(crate) fn route(
        &self,
        attribute: AttributeIndex,
        test: &SplitTest,
        record: &Record,
    ) -> Option<NodeIndex> {
        let value = record.get(self.catalog.attribute(attribute).name())?;
        match test {
            SplitTest::Threshold {
                threshold,
                left,
                right,
            } => value
                .as_number()
                .map(|v| if v <= *threshold { *left } else { *right }),
            SplitTest::Categories { branches } => branches
                .iter()
                .find(|(label, _)| label == value.as_str())
                .map(|(_, child)| *child),
        }
    }

    /// Return the predicted class label for `record`.
    #[must_use]
    pub fn predict_label(&self, record: &Record) -> &str {
        self.classes().label(self.predict(record).class)
    }

    /// Return the node at `index`.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    /// Return all nodes in arena order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the catalog of the training records.
    #[must_use]
    pub fn catalog(&self) -> &AttributeCatalog {
        &self.catalog
    }

    /// Return the class labels the tree can predict.
    #[must_use]
    pub fn classes(&self) -> &ClassSet {
        self.catalog.classes()
    }

    /// Return the target attribute name.
    #[must_use]
    pub fn target(&self) -> &str {
        self.catalog.target()
    }

    /// Return the criterion the tree was built with.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a single root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((NodeIndex::new(0), 0usize));

        while let Some((idx, d)) = queue.pop_front() {
            max_depth = max_depth.max(d);
            for child in self.nodes[idx.index()].children() {
                queue.push_back((child, d + 1));
            }
        }
        max_depth
    }

    /// Drop nodes unreachable from the root and renumber in pre-order.
    pub(crate) fn compact(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeIndex::new(0)];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx.index()].children().into_iter().rev());
        }

        let mut remap = vec![0usize; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.index()] = new;
        }

        let mut nodes: Vec<Node> = order.iter().map(|&old| self.nodes[old.index()].clone()).collect();
        for node in &mut nodes {
            if let Node::Split { test, .. } = node {
                test.remap(|child| NodeIndex::new(remap[child.index()]));
            }
        }
        self.nodes = nodes;
    }
}
