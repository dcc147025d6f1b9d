use std::fmt;

use crate::catalog::{AttributeIndex, ClassIndex};

/// Index into a `Vec<Node>` arena, identifying a node of a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Wrap an arena index; `NodeIndex::new(0)` is always the root.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Training statistics recorded at every node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeStats {
    /// Training records per class, indexed by [`ClassIndex`].
    pub class_counts: Vec<usize>,
    /// Number of training records that reached this node.
    pub n_samples: usize,
    /// Majority class of the records at this node.
    pub prediction: ClassIndex,
    /// Impurity under the criterion the tree was built with.
    pub impurity: f64,
}

impl NodeStats {
    /// Number of training records at this node not of the majority class.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.n_samples - self.class_counts[self.prediction.index()]
    }
}

/// Routing test of an interior node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitTest {
    /// Binary test on a continuous attribute.
    Threshold {
        /// Records with value `<= threshold` go left.
        threshold: f64,
        /// Child for `<= threshold`.
        left: NodeIndex,
        /// Child for `> threshold`.
        right: NodeIndex,
    },
    /// One branch per categorical value observed at this node.
    Categories {
        /// `(value, child)` pairs in lexicographic value order.
        branches: Vec<(String, NodeIndex)>,
    },
}

impl SplitTest {
    /// Return the children in branch order.
    #[must_use]
    pub fn children(&self) -> Vec<NodeIndex> {
        match self {
            SplitTest::Threshold { left, right, .. } => vec![*left, *right],
            SplitTest::Categories { branches } => branches.iter().map(|(_, c)| *c).collect(),
        }
    }

    pub(crate) fn remap(&mut self, map: impl Fn(NodeIndex) -> NodeIndex) {
        match self {
            SplitTest::Threshold { left, right, .. } => {
                *left = map(*left);
                *right = map(*right);
            }
            SplitTest::Categories { branches } => {
                for (_, child) in branches {
                    *child = map(*child);
                }
            }
        }
    }
}

/// A node in a decision tree arena.
///
/// Children are referenced by [`NodeIndex`]; the root is index 0 and every
/// non-root node has exactly one parent.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Attribute tested at this node.
        attribute: AttributeIndex,
        /// Routing test and children.
        test: SplitTest,
        /// Score of the split under the build criterion.
        score: f64,
        /// Impurity decrease achieved by the split.
        gain: f64,
        /// Training statistics before splitting.
        stats: NodeStats,
    },
    /// A terminal leaf node.
    Leaf {
        /// Training statistics of the records routed here.
        stats: NodeStats,
    },
}

impl Node {
    /// Return the training statistics of this node.
    #[must_use]
    pub fn stats(&self) -> &NodeStats {
        match self {
            Node::Split { stats, .. } | Node::Leaf { stats } => stats,
        }
    }

    /// Return the majority class of this node.
    #[must_use]
    pub fn prediction(&self) -> ClassIndex {
        self.stats().prediction
    }

    /// Return the number of training records that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.stats().n_samples
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Return the children in branch order; empty for a leaf.
    #[must_use]
    pub fn children(&self) -> Vec<NodeIndex> {
        match self {
            Node::Split { test, .. } => test.children(),
            Node::Leaf { .. } => Vec::new(),
        }
    }

    /// Replace this node by a leaf carrying the same statistics.
    pub(crate) fn collapse(&mut self) {
        if let Node::Split { stats, .. } = self {
            let stats = std::mem::replace(
                stats,
                NodeStats {
                    class_counts: Vec::new(),
                    n_samples: 0,
                    prediction: ClassIndex::new(0),
                    impurity: 0.0,
                },
            );
            *self = Node::Leaf { stats };
        }
    }
}
