//! Per-attribute cumulative split gain of a built tree.

use std::fmt;

use crate::node::Node;
use crate::tree::DecisionTree;

/// One attribute's contribution to a tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureImportance {
    /// 1-based rank (1 = largest cumulative gain).
    pub rank: usize,
    /// Attribute name.
    pub attribute: String,
    /// Sum over the attribute's split nodes of `gain * n_samples`.
    pub cumulative_gain: f64,
    /// Share of the tree's total cumulative gain, in [0, 1].
    pub share: f64,
    /// Number of split nodes testing this attribute.
    pub n_splits: usize,
}

/// Attributes used by a tree, sorted by descending cumulative gain.
///
/// Attributes never selected for a split are omitted, so a single-leaf tree
/// gives an empty table. Equal gains keep catalog order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportanceTable {
    rows: Vec<FeatureImportance>,
}

impl ImportanceTable {
    /// Accumulate the split gains of `tree`.
    #[must_use]
    pub fn from_tree(tree: &DecisionTree) -> Self {
        let n_attributes = tree.catalog().len();
        let mut gains = vec![0.0f64; n_attributes];
        let mut splits = vec![0usize; n_attributes];
        for node in tree.nodes() {
            if let Node::Split {
                attribute,
                gain,
                stats,
                ..
            } = node
            {
                gains[attribute.index()] += gain * stats.n_samples as f64;
                splits[attribute.index()] += 1;
            }
        }

        let total: f64 = gains.iter().sum();
        let mut rows: Vec<FeatureImportance> = tree
            .catalog()
            .attributes()
            .iter()
            .enumerate()
            .filter(|&(i, _)| splits[i] > 0)
            .map(|(i, attr)| FeatureImportance {
                rank: 0,
                attribute: attr.name().to_string(),
                cumulative_gain: gains[i],
                share: if total > 0.0 { gains[i] / total } else { 0.0 },
                n_splits: splits[i],
            })
            .collect();

        rows.sort_by(|a, b| b.cumulative_gain.total_cmp(&a.cumulative_gain));
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }
        Self { rows }
    }

    /// Return the rows in rank order.
    #[must_use]
    pub fn rows(&self) -> &[FeatureImportance] {
        &self.rows
    }

    /// Return the number of attributes listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Return `true` when no attribute was used.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ImportanceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.attribute.len())
            .chain(["attribute".len()])
            .max()
            .unwrap_or(9);
        writeln!(f, "{:>4}  {:<width$}  {:>12}  {:>7}  {:>6}", "rank", "attribute", "gain", "share", "splits")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>4}  {:<width$}  {:>12.6}  {:>6.2}%  {:>6}",
                row.rank,
                row.attribute,
                row.cumulative_gain,
                row.share * 100.0,
                row.n_splits
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeIndex;
    use crate::record::{Record, RecordParser};
    use crate::split::SplitCriterion;
    use crate::tree::TreeConfig;

    fn records(lines: &[&str]) -> Vec<Record> {
        RecordParser::new().parse_all(lines).unwrap()
    }

    #[test]
    fn single_leaf_has_empty_table() {
        let recs = records(&["a:1,cls:A", "a:2,cls:A", "a:3,cls:A", "a:4,cls:A", "a:5,cls:A"]);
        let tree = TreeConfig::new().fit(&recs, "cls").unwrap();
        let table = ImportanceTable::from_tree(&tree);
        assert!(table.is_empty());
    }

    #[test]
    fn gain_is_weighted_by_node_size() {
        let recs = records(&["a:1,cls:A", "a:2,cls:A", "a:3,cls:B", "a:4,cls:B"]);
        let tree = TreeConfig::new().fit(&recs, "cls").unwrap();
        let table = ImportanceTable::from_tree(&tree);
        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.rank, 1);
        assert_eq!(row.attribute, "a");
        assert_eq!(row.n_splits, 1);
        // information gain 1.0 over 4 records
        assert!((row.cumulative_gain - 4.0).abs() < 1e-10);
        assert!((row.share - 1.0).abs() < 1e-10);
    }

    #[test]
    fn gain_ratio_tree_ranks_by_impurity_gain() {
        let recs = records(&[
            "a:1,cls:A",
            "a:2,cls:A",
            "a:3,cls:A",
            "a:4,cls:A",
            "a:5,cls:B",
            "a:6,cls:B",
        ]);
        let tree = TreeConfig::new()
            .with_criterion(SplitCriterion::GainRatio)
            .fit(&recs, "cls")
            .unwrap();
        let Node::Split { score, .. } = tree.node(NodeIndex::new(0)) else {
            panic!("expected a split at the root");
        };
        // the pure threshold has ratio 1.0 but gain H(4/6, 2/6)
        assert!((score - 1.0).abs() < 1e-10);
        let table = ImportanceTable::from_tree(&tree);
        let expected = SplitCriterion::InfoGain.impurity(&[4, 2]) * 6.0;
        assert!((table.rows()[0].cumulative_gain - expected).abs() < 1e-10);
        assert!((table.rows()[0].cumulative_gain - 6.0).abs() > 0.1);
    }

    #[test]
    fn rows_sorted_by_descending_gain() {
        let recs = records(&[
            "c:r,n:1,cls:A",
            "c:r,n:5,cls:B",
            "c:g,n:1,cls:B",
            "c:g,n:5,cls:B",
        ]);
        let tree = TreeConfig::new().fit(&recs, "cls").unwrap();
        let table = ImportanceTable::from_tree(&tree);
        assert_eq!(table.len(), 2);
        assert!(table.rows()[0].cumulative_gain >= table.rows()[1].cumulative_gain);
        let shares: f64 = table.rows().iter().map(|r| r.share).sum();
        assert!((shares - 1.0).abs() < 1e-10);
        let text = table.to_string();
        assert_eq!(text.lines().count(), 3);
    }
}
