//! Read-only traversal of a tree for exporters.

use crate::node::{Node, NodeIndex, SplitTest};
use crate::tree::DecisionTree;

/// One node as seen by an exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    /// Arena index of the node.
    pub id: NodeIndex,
    /// Tested attribute for a split, predicted class for a leaf.
    pub label: String,
    /// Parent node; `None` for the root.
    pub parent: Option<NodeIndex>,
    /// Branch condition on the edge from the parent, e.g. `a <= 2.5` or `b = x`.
    pub predicate: Option<String>,
    /// Distance from the root.
    pub depth: usize,
    /// `true` for a leaf.
    pub is_leaf: bool,
    /// Majority class of the training records at the node.
    pub class: String,
    /// Training records that reached the node.
    pub n_samples: usize,
}

/// Receives nodes in pre-order from [`DecisionTree::walk`].
pub trait TreeVisitor {
    /// Called once per node, parents before children.
    fn visit(&mut self, node: &NodeView);
}

impl TreeVisitor for Vec<NodeView> {
    fn visit(&mut self, node: &NodeView) {
        self.push(node.clone());
    }
}

impl DecisionTree {
    /// Visit every node depth-first, parents before children and branches
    /// in order.
    pub fn walk<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        let mut stack: Vec<(NodeIndex, Option<NodeIndex>, Option<String>, usize)> =
            vec![(NodeIndex::new(0), None, None, 0)];

        while let Some((id, parent, predicate, depth)) = stack.pop() {
            let node = self.node(id);
            let class = self.classes().label(node.prediction()).to_string();
            let label = match node {
                Node::Split { attribute, .. } => self.catalog().attribute(*attribute).name().to_string(),
                Node::Leaf { .. } => class.clone(),
            };
            visitor.visit(&NodeView {
                id,
                label,
                parent,
                predicate,
                depth,
                is_leaf: node.is_leaf(),
                class,
                n_samples: node.n_samples(),
            });

            if let Node::Split { attribute, test, .. } = node {
                let name = self.catalog().attribute(*attribute).name();
                let edges: Vec<(String, NodeIndex)> = match test {
                    SplitTest::Threshold {
                        threshold,
                        left,
                        right,
                    } => vec![
                        (format!("{name} <= {threshold}"), *left),
                        (format!("{name} > {threshold}"), *right),
                    ],
                    SplitTest::Categories { branches } => branches
                        .iter()
                        .map(|(value, child)| (format!("{name} = {value}"), *child))
                        .collect(),
                };
                for (text, child) in edges.into_iter().rev() {
                    stack.push((child, Some(id), Some(text), depth + 1));
                }
            }
        }
    }

    /// Collect the pre-order node views.
    #[must_use]
    pub fn views(&self) -> Vec<NodeView> {
        let mut views = Vec::with_capacity(self.n_nodes());
        self.walk(&mut views);
        views
    }
}
