//! Attribute typing for a training set.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, instrument};

use crate::error::TreeError;
use crate::record::Record;

/// Zero-based position of an attribute in an [`AttributeCatalog`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct AttributeIndex(usize);

impl AttributeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based catalog position.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AttributeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-based position of a class label in lexicographic order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct ClassIndex(usize);

impl ClassIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based class position.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Inferred kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttributeKind {
    /// Split by equality, one branch per value.
    Categorical,
    /// Split by a `<= threshold` / `> threshold` test.
    Continuous,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Categorical => f.write_str("categorical"),
            AttributeKind::Continuous => f.write_str("continuous"),
        }
    }
}

/// Observed values of an attribute, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Domain {
    /// Distinct raw values in lexicographic order.
    Categorical(Vec<String>),
    /// Distinct numeric values in ascending order.
    Continuous(Vec<f64>),
}

/// A non-target attribute and its observed domain.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attribute {
    name: String,
    domain: Domain,
}

impl Attribute {
    /// Return the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the inferred kind.
    #[must_use]
    pub fn kind(&self) -> AttributeKind {
        match self.domain {
            Domain::Categorical(_) => AttributeKind::Categorical,
            Domain::Continuous(_) => AttributeKind::Continuous,
        }
    }

    /// Return the observed domain.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Midpoints between consecutive sorted values; empty for categorical
    /// attributes and for continuous attributes with one distinct value.
    #[must_use]
    pub fn thresholds(&self) -> Vec<f64> {
        match &self.domain {
            Domain::Continuous(values) => {
                values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
            }
            Domain::Categorical(_) => Vec::new(),
        }
    }

    /// Return the categorical value at `code` in domain order.
    pub(crate) fn category(&self, code: usize) -> Option<&str> {
        match &self.domain {
            Domain::Categorical(values) => values.get(code).map(String::as_str),
            Domain::Continuous(_) => None,
        }
    }
}

/// Class labels of the target attribute.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClassSet {
    /// Labels in lexicographic order; a [`ClassIndex`] points into this.
    labels: Vec<String>,
    /// `first_seen[c]` is the rank of class `c` by first appearance.
    first_seen: Vec<usize>,
}

impl ClassSet {
    fn from_records(records: &[Record], target: &str) -> Self {
        let mut order: Vec<&str> = Vec::new();
        for record in records {
            if let Some(label) = record.class(target)
                && !order.contains(&label)
            {
                order.push(label);
            }
        }
        let labels: Vec<String> = order
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect();
        let first_seen = labels
            .iter()
            .map(|l| order.iter().position(|o| o == l).unwrap_or(usize::MAX))
            .collect();
        Self { labels, first_seen }
    }

    /// Return the labels in lexicographic order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Return the number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Return `true` when there are no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Return the label of a class.
    #[must_use]
    pub fn label(&self, class: ClassIndex) -> &str {
        &self.labels[class.index()]
    }

    /// Look up the class of a label.
    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<ClassIndex> {
        self.labels
            .binary_search_by(|l| l.as_str().cmp(label))
            .ok()
            .map(ClassIndex::new)
    }

    /// Return the first-appearance rank of a class.
    #[must_use]
    pub fn first_seen_rank(&self, class: ClassIndex) -> usize {
        self.first_seen[class.index()]
    }
}

/// Typed view of every non-target attribute of a training set.
///
/// Attributes appear in order of first appearance across the records, which
/// is also the order used to break ties between equally good splits.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttributeCatalog {
    target: String,
    attributes: Vec<Attribute>,
    classes: ClassSet,
}

impl AttributeCatalog {
    /// Scan `records` and classify each non-target attribute.
    ///
    /// An attribute is continuous only when every observed value matches the
    /// numeric pattern.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::UnknownTarget`] | no record carries `target` |
    /// | [`TreeError::MissingTargetValue`] | some record lacks `target` |
    #[instrument(skip(records), fields(n_records = records.len()))]
    pub fn build(records: &[Record], target: &str) -> Result<Self, TreeError> {
        if !records.is_empty() && records.iter().all(|r| r.get(target).is_none()) {
            return Err(TreeError::UnknownTarget {
                target: target.to_string(),
            });
        }
        if let Some(record) = records.iter().find(|r| r.get(target).is_none()) {
            return Err(TreeError::MissingTargetValue {
                record: record.id().to_string(),
                target: target.to_string(),
            });
        }

        let mut names: Vec<&str> = Vec::new();
        for record in records {
            for (name, _) in record.iter() {
                if name != target && !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let attributes: Vec<Attribute> = names
            .iter()
            .map(|&name| {
                let observed = records.iter().filter_map(|r| r.get(name));
                let continuous = observed.clone().all(|v| v.is_numeric());
                let domain = if continuous {
                    let mut values: Vec<f64> = observed.filter_map(|v| v.as_number()).collect();
                    values.sort_unstable_by(f64::total_cmp);
                    values.dedup();
                    Domain::Continuous(values)
                } else {
                    let values: BTreeSet<&str> = observed.map(|v| v.as_str()).collect();
                    Domain::Categorical(values.into_iter().map(String::from).collect())
                };
                Attribute {
                    name: name.to_string(),
                    domain,
                }
            })
            .collect();

        let classes = ClassSet::from_records(records, target);

        debug!(
            n_attributes = attributes.len(),
            n_classes = classes.len(),
            "attribute catalog built"
        );

        Ok(Self {
            target: target.to_string(),
            attributes,
            classes,
        })
    }

    /// Return the target attribute name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return the attributes in catalog order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Return one attribute.
    #[must_use]
    pub fn attribute(&self, index: AttributeIndex) -> &Attribute {
        &self.attributes[index.index()]
    }

    /// Find an attribute by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<AttributeIndex> {
        self.attributes
            .iter()
            .position(|a| a.name == name)
            .map(AttributeIndex::new)
    }

    /// Return the number of non-target attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Return `true` when there is no candidate attribute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Return the target's class labels.
    #[must_use]
    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }
}
