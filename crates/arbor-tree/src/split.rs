use std::fmt;
use std::str::FromStr;

use crate::catalog::{AttributeCatalog, AttributeIndex, Domain};
use crate::error::TreeError;
use crate::record::Record;

/// Scores at or below this are treated as "no gain".
pub(crate) const MIN_SCORE: f64 = 1e-12;

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Entropy reduction: `H(S) - Σ |b|/|S| · H(b)`, `H = -Σ p·log2(p)`.
    InfoGain,
    /// Gini impurity reduction, impurity `1 - Σ p²`.
    Gini,
    /// Information gain divided by split information.
    GainRatio,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Entropy for `InfoGain` and `GainRatio`, Gini impurity for `Gini`.
    /// Returns 0.0 for an empty node.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize]) -> f64 {
        match self {
            SplitCriterion::InfoGain | SplitCriterion::GainRatio => entropy(class_counts),
            SplitCriterion::Gini => gini(class_counts),
        }
    }

    /// Impurity decrease from splitting `parent` into `branches`.
    #[must_use]
    pub fn gain(&self, parent: &[usize], branches: &[Vec<usize>]) -> f64 {
        let n: usize = parent.iter().sum();
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let weighted: f64 = branches
            .iter()
            .map(|b| {
                let nb: usize = b.iter().sum();
                (nb as f64 / n) * self.impurity(b)
            })
            .sum();
        self.impurity(parent) - weighted
    }

    /// Score a split of `parent` into `branches` (class counts per branch).
    ///
    /// Higher is better. For `GainRatio` a split with zero split
    /// information scores 0, and so does a multiway split that isolates
    /// every record in its own branch.
    #[must_use]
    pub fn score(&self, parent: &[usize], branches: &[Vec<usize>]) -> f64 {
        let gain = self.gain(parent, branches);
        match self {
            SplitCriterion::InfoGain | SplitCriterion::Gini => gain,
            SplitCriterion::GainRatio => {
                let sizes: Vec<usize> = branches.iter().map(|b| b.iter().sum()).collect();
                let one_per_branch = sizes.len() > 2 && sizes.iter().all(|&s| s == 1);
                let split_info = entropy(&sizes);
                if one_per_branch || split_info <= f64::EPSILON {
                    0.0
                } else {
                    gain / split_info
                }
            }
        }
    }
}

impl fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitCriterion::InfoGain => f.write_str("InfoGain"),
            SplitCriterion::Gini => f.write_str("GiniIndex"),
            SplitCriterion::GainRatio => f.write_str("GainRatio"),
        }
    }
}

impl FromStr for SplitCriterion {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infogain" | "ig" | "entropy" => Ok(SplitCriterion::InfoGain),
            "giniindex" | "gi" | "gini" => Ok(SplitCriterion::Gini),
            "gainratio" | "gr" => Ok(SplitCriterion::GainRatio),
            _ => Err(TreeError::UnknownCriterion {
                name: s.to_string(),
            }),
        }
    }
}

fn entropy(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.log2()
        })
        .sum::<f64>()
}

fn gini(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

/// One attribute column of a training set, aligned with the labels.
pub(crate) enum Column {
    /// Numeric values; `None` when the record lacks the attribute.
    Continuous(Vec<Option<f64>>),
    /// Positions into the catalog's categorical domain.
    Categorical(Vec<Option<usize>>),
}

/// Column-major training data built once per tree.
pub(crate) struct TrainingTable {
    pub(crate) columns: Vec<Column>,
    pub(crate) labels: Vec<usize>,
    pub(crate) n_classes: usize,
}

impl TrainingTable {
    /// Build the table for `records`, which must all carry the target.
    pub(crate) fn build(records: &[Record], catalog: &AttributeCatalog) -> Self {
        let classes = catalog.classes();
        let labels = records
            .iter()
            .map(|r| {
                r.class(catalog.target())
                    .and_then(|l| classes.index_of(l))
                    .map_or(0, |c| c.index())
            })
            .collect();

        let columns = catalog
            .attributes()
            .iter()
            .map(|attr| match attr.domain() {
                Domain::Continuous(_) => Column::Continuous(
                    records
                        .iter()
                        .map(|r| r.get(attr.name()).and_then(|v| v.as_number()))
                        .collect(),
                ),
                Domain::Categorical(values) => Column::Categorical(
                    records
                        .iter()
                        .map(|r| {
                            r.get(attr.name()).and_then(|v| {
                                values
                                    .binary_search_by(|c| c.as_str().cmp(v.as_str()))
                                    .ok()
                            })
                        })
                        .collect(),
                ),
            })
            .collect();

        Self {
            columns,
            labels,
            n_classes: classes.len(),
        }
    }

    pub(crate) fn class_counts(&self, sample_indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &si in sample_indices {
            counts[self.labels[si]] += 1;
        }
        counts
    }
}

/// The test selected for a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CandidateTest {
    /// `<= threshold` goes to partition 0, `> threshold` to partition 1.
    Threshold(f64),
    /// Partition `i` holds the records whose value is `codes[i]`.
    Categories(Vec<usize>),
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) attribute: AttributeIndex,
    pub(crate) test: CandidateTest,
    pub(crate) score: f64,
    /// Impurity decrease of the split, equal to `score` except for gain ratio.
    pub(crate) gain: f64,
    /// Sample indices per branch, in the order of `test`.
    pub(crate) partitions: Vec<Vec<usize>>,
}

/// Index of the largest branch; first wins on ties.
fn largest(sizes: impl IntoIterator<Item = usize>) -> usize {
    let mut best = 0;
    let mut best_size = 0;
    for (i, size) in sizes.into_iter().enumerate() {
        if size > best_size {
            best = i;
            best_size = size;
        }
    }
    best
}

fn add_into(target: &mut [usize], extra: &[usize]) {
    for (t, e) in target.iter_mut().zip(extra) {
        *t += e;
    }
}

/// Find the highest-scoring split over the active attributes.
///
/// Attributes are scanned in catalog order and thresholds in ascending
/// order; only a strictly better score replaces the current best, so the
/// first candidate wins ties. Records that lack the attribute join the
/// largest branch.
///
/// Returns `None` when no attribute yields at least two non-empty branches.
pub(crate) fn find_best_split(
    table: &TrainingTable,
    sample_indices: &[usize],
    active: &[bool],
    criterion: &SplitCriterion,
) -> Option<SplitResult> {
    if sample_indices.len() < 2 {
        return None;
    }
    let parent_counts = table.class_counts(sample_indices);

    let mut best: Option<(AttributeIndex, CandidateTest, f64)> = None;
    let mut best_score = f64::NEG_INFINITY;

    for (attr_idx, column) in table.columns.iter().enumerate() {
        if !active[attr_idx] {
            continue;
        }
        let candidate = match column {
            Column::Continuous(values) => {
                best_threshold(table, values, sample_indices, &parent_counts, criterion)
            }
            Column::Categorical(codes) => {
                category_split(table, codes, sample_indices, &parent_counts, criterion)
            }
        };
        if let Some((test, score)) = candidate
            && score > best_score
        {
            best_score = score;
            best = Some((AttributeIndex::new(attr_idx), test, score));
        }
    }

    let (attribute, test, score) = best?;
    let partitions = partition(table, attribute, &test, sample_indices);
    let branch_counts: Vec<Vec<usize>> =
        partitions.iter().map(|p| table.class_counts(p)).collect();
    let gain = criterion.gain(&parent_counts, &branch_counts);
    Some(SplitResult {
        attribute,
        test,
        score,
        gain,
        partitions,
    })
}

fn best_threshold(
    table: &TrainingTable,
    values: &[Option<f64>],
    sample_indices: &[usize],
    parent_counts: &[usize],
    criterion: &SplitCriterion,
) -> Option<(CandidateTest, f64)> {
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(sample_indices.len());
    let mut missing = vec![0usize; table.n_classes];
    for &si in sample_indices {
        match values[si] {
            Some(v) => sorted.push((v, table.labels[si])),
            None => missing[table.labels[si]] += 1,
        }
    }
    if sorted.len() < 2 {
        return None;
    }
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut present = parent_counts.to_vec();
    for (p, m) in present.iter_mut().zip(&missing) {
        *p -= m;
    }

    let mut left = vec![0usize; table.n_classes];
    let mut right = present;
    let mut best: Option<(f64, f64)> = None;

    for i in 0..(sorted.len() - 1) {
        let (value, class) = sorted[i];
        left[class] += 1;
        right[class] -= 1;

        let next = sorted[i + 1].0;
        if value == next {
            continue;
        }

        let n_left = i + 1;
        let n_right = sorted.len() - n_left;
        let mut branches = vec![left.clone(), right.clone()];
        let fallback = largest([n_left, n_right]);
        add_into(&mut branches[fallback], &missing);

        let score = criterion.score(parent_counts, &branches);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some(((value + next) / 2.0, score));
        }
    }

    best.map(|(threshold, score)| (CandidateTest::Threshold(threshold), score))
}

fn category_split(
    table: &TrainingTable,
    codes: &[Option<usize>],
    sample_indices: &[usize],
    parent_counts: &[usize],
    criterion: &SplitCriterion,
) -> Option<(CandidateTest, f64)> {
    // BTreeMap keeps branches in domain order.
    let mut per_code: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    let mut missing = vec![0usize; table.n_classes];
    for &si in sample_indices {
        let class = table.labels[si];
        match codes[si] {
            Some(code) => {
                per_code.entry(code).or_insert_with(|| vec![0; table.n_classes])[class] += 1;
            }
            None => missing[class] += 1,
        }
    }
    if per_code.len() < 2 {
        return None;
    }

    let order: Vec<usize> = per_code.keys().copied().collect();
    let mut branches: Vec<Vec<usize>> = per_code.into_values().collect();
    let fallback = largest(branches.iter().map(|b| b.iter().sum()));
    add_into(&mut branches[fallback], &missing);

    let score = criterion.score(parent_counts, &branches);
    Some((CandidateTest::Categories(order), score))
}

/// Route every sample to its branch; samples lacking the attribute go to
/// the branch with the most present samples.
fn partition(
    table: &TrainingTable,
    attribute: AttributeIndex,
    test: &CandidateTest,
    sample_indices: &[usize],
) -> Vec<Vec<usize>> {
    let column = &table.columns[attribute.index()];
    let n_branches = match test {
        CandidateTest::Threshold(_) => 2,
        CandidateTest::Categories(codes) => codes.len(),
    };
    let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); n_branches];
    let mut missing: Vec<usize> = Vec::new();

    for &si in sample_indices {
        let branch = match (column, test) {
            (Column::Continuous(values), CandidateTest::Threshold(t)) => {
                values[si].map(|v| if v <= *t { 0 } else { 1 })
            }
            (Column::Categorical(values), CandidateTest::Categories(codes)) => {
                values[si].and_then(|c| codes.iter().position(|&code| code == c))
            }
            _ => None,
        };
        match branch {
            Some(b) => partitions[b].push(si),
            None => missing.push(si),
        }
    }

    if !missing.is_empty() {
        let fallback = largest(partitions.iter().map(Vec::len));
        partitions[fallback].extend(missing);
        partitions[fallback].sort_unstable();
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordParser;

    fn table(lines: &[&str]) -> (TrainingTable, AttributeCatalog) {
        let records = RecordParser::new().parse_all(lines).unwrap();
        let catalog = AttributeCatalog::build(&records, "cls").unwrap();
        (TrainingTable::build(&records, &catalog), catalog)
    }

    #[test]
    fn entropy_pure_and_balanced() {
        assert!((SplitCriterion::InfoGain.impurity(&[10, 0]) - 0.0).abs() < f64::EPSILON);
        assert!((SplitCriterion::InfoGain.impurity(&[5, 5]) - 1.0).abs() < 1e-10);
        assert!((SplitCriterion::InfoGain.impurity(&[1, 1, 1, 1]) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn gini_pure_and_balanced() {
        assert!((SplitCriterion::Gini.impurity(&[10, 0, 0]) - 0.0).abs() < f64::EPSILON);
        assert!((SplitCriterion::Gini.impurity(&[5, 5]) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn info_gain_of_perfect_binary_split() {
        let score = SplitCriterion::InfoGain.score(&[2, 2], &[vec![2, 0], vec![0, 2]]);
        assert!((score - 1.0).abs() < 1e-10);
    }

    #[test]
    fn gini_decrease_of_perfect_binary_split() {
        let score = SplitCriterion::Gini.score(&[2, 2], &[vec![2, 0], vec![0, 2]]);
        assert!((score - 0.5).abs() < 1e-10);
    }

    #[test]
    fn gain_ratio_with_zero_split_information_is_zero() {
        let score = SplitCriterion::GainRatio.score(&[2, 2], &[vec![2, 2]]);
        assert!((score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gain_ratio_of_one_record_per_branch_is_zero() {
        // four singleton branches: gain 1, split info 2
        let singletons = vec![vec![1, 0], vec![1, 0], vec![0, 1], vec![0, 1]];
        assert!((SplitCriterion::InfoGain.score(&[2, 2], &singletons) - 1.0).abs() < 1e-10);
        let id_like = SplitCriterion::GainRatio.score(&[2, 2], &singletons);
        assert!((id_like - 0.0).abs() < f64::EPSILON);
        let binary = SplitCriterion::GainRatio.score(&[2, 2], &[vec![2, 0], vec![0, 2]]);
        assert!((binary - 1.0).abs() < 1e-10);
    }

    #[test]
    fn weak_binary_split_beats_identifier_under_gain_ratio() {
        // `w` splits AAAB / ABBB, `id` is unique per record
        let classes = ["A", "A", "A", "B", "A", "B", "B", "B"];
        let lines: Vec<String> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| format!("id:r{i},w:{},cls:{c}", if i < 4 { "x" } else { "y" }))
            .collect();
        let records = RecordParser::new().parse_all(&lines).unwrap();
        let catalog = AttributeCatalog::build(&records, "cls").unwrap();
        let t = TrainingTable::build(&records, &catalog);
        let samples: Vec<usize> = (0..8).collect();

        let split =
            find_best_split(&t, &samples, &[true, true], &SplitCriterion::GainRatio).unwrap();
        assert_eq!(catalog.attribute(split.attribute).name(), "w");
        assert!(split.score > MIN_SCORE);

        let only_id =
            find_best_split(&t, &samples, &[true, false], &SplitCriterion::GainRatio).unwrap();
        assert!(only_id.score <= MIN_SCORE);
    }

    #[test]
    fn gain_ratio_split_keeps_impurity_gain() {
        let (t, _) = table(&[
            "a:1,cls:A",
            "a:2,cls:A",
            "a:3,cls:A",
            "a:4,cls:A",
            "a:5,cls:B",
            "a:6,cls:B",
        ]);
        let samples: Vec<usize> = (0..6).collect();
        let split = find_best_split(&t, &samples, &[true], &SplitCriterion::GainRatio).unwrap();
        let entropy = SplitCriterion::InfoGain.impurity(&[4, 2]);
        assert!((split.score - 1.0).abs() < 1e-10);
        assert!((split.gain - entropy).abs() < 1e-10);
    }

    #[test]
    fn criterion_names_parse() {
        assert_eq!("IG".parse::<SplitCriterion>().unwrap(), SplitCriterion::InfoGain);
        assert_eq!("GiniIndex".parse::<SplitCriterion>().unwrap(), SplitCriterion::Gini);
        assert_eq!("gainratio".parse::<SplitCriterion>().unwrap(), SplitCriterion::GainRatio);
        assert!(matches!(
            "c4.5".parse::<SplitCriterion>(),
            Err(TreeError::UnknownCriterion { .. })
        ));
    }

    #[test]
    fn balanced_threshold_is_found_by_every_criterion() {
        let (t, _) = table(&["a:1,cls:A", "a:2,cls:A", "a:3,cls:B", "a:4,cls:B"]);
        let samples: Vec<usize> = (0..4).collect();
        for criterion in [
            SplitCriterion::InfoGain,
            SplitCriterion::Gini,
            SplitCriterion::GainRatio,
        ] {
            let split = find_best_split(&t, &samples, &[true], &criterion).unwrap();
            assert_eq!(split.test, CandidateTest::Threshold(2.5), "{criterion}");
            assert_eq!(split.partitions, vec![vec![0, 1], vec![2, 3]]);
        }
    }

    #[test]
    fn categorical_split_has_one_branch_per_value() {
        let (t, catalog) = table(&["c:r,cls:A", "c:g,cls:B", "c:b,cls:C", "c:r,cls:A"]);
        let samples: Vec<usize> = (0..4).collect();
        let split = find_best_split(&t, &samples, &[true], &SplitCriterion::InfoGain).unwrap();
        let Domain::Categorical(values) = catalog.attributes()[0].domain() else {
            panic!("expected categorical domain");
        };
        assert_eq!(values, &["b", "g", "r"]);
        assert_eq!(split.test, CandidateTest::Categories(vec![0, 1, 2]));
        assert_eq!(split.partitions, vec![vec![2], vec![1], vec![0, 3]]);
    }

    #[test]
    fn first_attribute_wins_ties() {
        let (t, _) = table(&["a:x,b:p,cls:A", "a:y,b:q,cls:B"]);
        let samples = vec![0, 1];
        let split =
            find_best_split(&t, &samples, &[true, true], &SplitCriterion::InfoGain).unwrap();
        assert_eq!(split.attribute.index(), 0);
    }

    #[test]
    fn inactive_attributes_are_skipped() {
        let (t, _) = table(&["a:x,b:p,cls:A", "a:y,b:q,cls:B"]);
        let samples = vec![0, 1];
        let split =
            find_best_split(&t, &samples, &[false, true], &SplitCriterion::InfoGain).unwrap();
        assert_eq!(split.attribute.index(), 1);
    }

    #[test]
    fn constant_attribute_yields_no_split() {
        let (t, _) = table(&["a:5,cls:A", "a:5,cls:B", "a:5,cls:A"]);
        let samples: Vec<usize> = (0..3).collect();
        assert!(find_best_split(&t, &samples, &[true], &SplitCriterion::Gini).is_none());
    }

    #[test]
    fn missing_values_join_the_largest_branch() {
        let (t, _) = table(&[
            "a:1,cls:A",
            "a:2,cls:A",
            "a:3,cls:A",
            "a:10,cls:B",
            "cls:A",
        ]);
        let samples: Vec<usize> = (0..5).collect();
        let split = find_best_split(&t, &samples, &[true], &SplitCriterion::InfoGain).unwrap();
        assert_eq!(split.test, CandidateTest::Threshold(6.5));
        assert_eq!(split.partitions, vec![vec![0, 1, 2, 4], vec![3]]);
    }
}
