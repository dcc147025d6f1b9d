//! Decision tree induction over `attr:value` records: build, prune,
//! evaluate, cross-validate, rank attributes.
//!
//! Records are parsed once into typed [`Record`]s, an [`AttributeCatalog`]
//! types every candidate attribute, and a single [`TreeConfig`] builds a
//! tree under any [`SplitCriterion`]. A [`Session`] holds one caller's
//! record lists and runs the whole pipeline.

mod catalog;
mod confusion;
mod cv;
mod error;
mod evaluate;
mod importance;
mod node;
mod prune;
mod record;
mod serialize;
mod session;
mod split;
mod tree;
mod view;

pub use catalog::{
    Attribute, AttributeCatalog, AttributeIndex, AttributeKind, ClassIndex, ClassSet, Domain,
};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use cv::{CrossValidation, CrossValidationResult, FoldResult};
pub use error::{ErrorKind, TreeError};
pub use evaluate::Evaluation;
pub use importance::{FeatureImportance, ImportanceTable};
pub use node::{Node, NodeIndex, NodeStats, SplitTest};
pub use prune::{Holdout, PruningConfig, PruningStrategy};
pub use record::{Record, RecordId, RecordParser, Value, is_numeric, parse_flag};
pub use session::{Outcome, RunReport, RunRequest, Session};
pub use split::SplitCriterion;
pub use tree::{DecisionTree, MaxDepth, Prediction, TieBreak, Trained, TreeConfig, ZeroDepth};
pub use view::{NodeView, TreeVisitor};
