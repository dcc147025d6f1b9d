//! Caller-owned data context for interactive runs.
//!
//! A [`Session`] holds the train, test and pooled record lists of one
//! caller. Every operation borrows the session, so independent sessions
//! never share state.

use std::time::Duration;

use tracing::{info, instrument};

use crate::{
    TreeError,
    cv::{CrossValidation, CrossValidationResult},
    evaluate::Evaluation,
    importance::ImportanceTable,
    prune::PruningConfig,
    record::{Record, RecordParser, parse_flag},
    split::SplitCriterion,
    tree::{DecisionTree, MaxDepth, TieBreak, TreeConfig, ZeroDepth},
};

/// Result of a session operation that may have nothing to work on.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The operation ran.
    Ready(T),
    /// The relevant record lists are empty.
    NoData,
}

impl<T> Outcome<T> {
    /// Return the value, or `None` for [`Outcome::NoData`].
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::NoData => None,
        }
    }

    /// Return `true` for [`Outcome::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }
}

/// Parameters of one build-and-evaluate run.
///
/// # Defaults
///
/// | Parameter   | Default        |
/// |-------------|----------------|
/// | `criterion` | `InfoGain`     |
/// | `max_depth` | `Unlimited`    |
/// | `tie_break` | `Lexicographic`|
/// | `pruning`   | `None`         |
/// | `deadline`  | `None`         |
#[derive(Debug, Clone)]
pub struct RunRequest {
    target: String,
    config: TreeConfig,
}

impl RunRequest {
    /// Create a request predicting `target` with default settings.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            config: TreeConfig::new(),
        }
    }

    /// Build a request from string-encoded boundary inputs.
    ///
    /// `pruned` is a boolean-like flag, `max_depth` is read with
    /// [`MaxDepth::from_legacy`] under `zero`, and `criterion` is a
    /// [`SplitCriterion`] name.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::InvalidFlag`] | `pruned` is not boolean-like |
    /// | [`TreeError::InvalidMaxDepth`] | `max_depth` is negative or not a number |
    /// | [`TreeError::UnknownCriterion`] | `criterion` is not recognised |
    pub fn from_strings(
        target: &str,
        pruned: &str,
        max_depth: &str,
        criterion: &str,
        zero: ZeroDepth,
    ) -> Result<Self, TreeError> {
        let pruning = parse_flag(pruned)?.then(PruningConfig::new);
        Ok(Self::new(target)
            .with_criterion(criterion.parse()?)
            .with_max_depth(MaxDepth::from_legacy(max_depth, zero)?)
            .with_pruning(pruning))
    }

    /// Set the split criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.config = self.config.with_criterion(criterion);
        self
    }

    /// Set the depth bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: MaxDepth) -> Self {
        self.config = self.config.with_max_depth(max_depth);
        self
    }

    /// Set the tie-break rule.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.config = self.config.with_tie_break(tie_break);
        self
    }

    /// Enable or disable pruning.
    #[must_use]
    pub fn with_pruning(mut self, pruning: Option<PruningConfig>) -> Self {
        self.config = self.config.with_pruning(pruning);
        self
    }

    /// Bound tree construction time.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.config = self.config.with_deadline(deadline);
        self
    }

    /// Return the target attribute.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return the tree configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }
}

/// Everything produced by [`Session::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The final tree.
    pub tree: DecisionTree,
    /// Test-set evaluation.
    pub evaluation: Evaluation,
    /// Attribute importance of the final tree.
    pub importance: ImportanceTable,
    /// Time to grow and prune.
    pub build_duration: Duration,
    /// Nodes removed by pruning.
    pub pruned_nodes: usize,
}

/// Train, test and pooled record lists of one caller.
#[derive(Debug, Clone, Default)]
pub struct Session {
    parser: RecordParser,
    train: Vec<Record>,
    test: Vec<Record>,
    pooled: Vec<Record>,
}

impl Session {
    /// Create an empty session parsing lines with `parser`.
    #[must_use]
    pub fn new(parser: RecordParser) -> Self {
        Self {
            parser,
            ..Self::default()
        }
    }

    /// Replace the training records; returns how many were loaded.
    ///
    /// # Errors
    ///
    /// Any parse error of [`RecordParser::parse_all`]; the session is left
    /// unchanged.
    pub fn load_train<I, S>(&mut self, lines: I) -> Result<usize, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.train = self.parser.parse_all(lines)?;
        Ok(self.train.len())
    }

    /// Replace the test records; returns how many were loaded.
    ///
    /// # Errors
    ///
    /// See [`Session::load_train`].
    pub fn load_test<I, S>(&mut self, lines: I) -> Result<usize, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.test = self.parser.parse_all(lines)?;
        Ok(self.test.len())
    }

    /// Replace the pooled records used by cross-validation and
    /// [`Session::auto_split`]; returns how many were loaded.
    ///
    /// # Errors
    ///
    /// See [`Session::load_train`].
    pub fn load_pooled<I, S>(&mut self, lines: I) -> Result<usize, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.pooled = self.parser.parse_all(lines)?;
        Ok(self.pooled.len())
    }

    /// Return the training records.
    #[must_use]
    pub fn train(&self) -> &[Record] {
        &self.train
    }

    /// Return the test records.
    #[must_use]
    pub fn test(&self) -> &[Record] {
        &self.test
    }

    /// Return the pooled records.
    #[must_use]
    pub fn pooled(&self) -> &[Record] {
        &self.pooled
    }

    /// Drop every record list.
    pub fn clear(&mut self) {
        self.train.clear();
        self.test.clear();
        self.pooled.clear();
    }

    /// Fill train with the first `floor(n * train_ratio)` pooled records and
    /// test with the rest; returns `(n_train, n_test)`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidTrainRatio`] unless `train_ratio` lies in
    /// [0, 1].
    pub fn auto_split(&mut self, train_ratio: f64) -> Result<(usize, usize), TreeError> {
        if !(0.0..=1.0).contains(&train_ratio) {
            return Err(TreeError::InvalidTrainRatio { ratio: train_ratio });
        }
        let n_train = (self.pooled.len() as f64 * train_ratio).floor() as usize;
        self.train = self.pooled[..n_train].to_vec();
        self.test = self.pooled[n_train..].to_vec();
        Ok((self.train.len(), self.test.len()))
    }

    /// Build on train, optionally prune, and evaluate on test.
    ///
    /// Returns [`Outcome::NoData`] when both lists are empty.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::EmptyTrainingSet`] | test records but no training records |
    /// | [`TreeError::EmptyTestSet`] | training records but no test records |
    /// | Other tree errors | from building, pruning or evaluating |
    #[instrument(skip_all, fields(target = request.target(), n_train = self.train.len(), n_test = self.test.len()))]
    pub fn run(&self, request: &RunRequest) -> Result<Outcome<RunReport>, TreeError> {
        match (self.train.is_empty(), self.test.is_empty()) {
            (true, true) => return Ok(Outcome::NoData),
            (true, false) => return Err(TreeError::EmptyTrainingSet),
            (false, true) => return Err(TreeError::EmptyTestSet),
            (false, false) => {}
        }

        let trained = request
            .config()
            .train(&self.train, &self.test, request.target())?;
        let evaluation = trained.tree.evaluate(&self.test)?;
        let importance = ImportanceTable::from_tree(&trained.tree);

        info!(
            n_nodes = trained.tree.n_nodes(),
            pruned_nodes = trained.pruned_nodes,
            accuracy = evaluation.accuracy(),
            mcc = evaluation.mcc(),
            "run complete"
        );

        Ok(Outcome::Ready(RunReport {
            tree: trained.tree,
            evaluation,
            importance,
            build_duration: trained.build_duration,
            pruned_nodes: trained.pruned_nodes,
        }))
    }

    /// Cross-validate over the pooled records.
    ///
    /// Returns [`Outcome::NoData`] when the pool is empty.
    ///
    /// # Errors
    ///
    /// See [`CrossValidation::evaluate`].
    pub fn cross_validate(
        &self,
        request: &RunRequest,
        cv: &CrossValidation,
    ) -> Result<Outcome<CrossValidationResult>, TreeError> {
        if self.pooled.is_empty() {
            return Ok(Outcome::NoData);
        }
        cv.evaluate(request.config(), &self.pooled, request.target())
            .map(Outcome::Ready)
    }

    /// Build on train (with pruning if requested) and report attribute
    /// importance.
    ///
    /// Returns [`Outcome::NoData`] when there are no training records.
    ///
    /// # Errors
    ///
    /// See [`TreeConfig::train`].
    pub fn feature_table(&self, request: &RunRequest) -> Result<Outcome<ImportanceTable>, TreeError> {
        if self.train.is_empty() {
            return Ok(Outcome::NoData);
        }
        let trained = request
            .config()
            .train(&self.train, &self.test, request.target())?;
        Ok(Outcome::Ready(ImportanceTable::from_tree(&trained.tree)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEPARABLE: [&str; 4] = [
        "a:1,b:x,cls:yes",
        "a:2,b:y,cls:no",
        "a:1,b:y,cls:yes",
        "a:2,b:x,cls:no",
    ];

    fn session() -> Session {
        Session::new(RecordParser::new().with_target("cls"))
    }

    #[test]
    fn empty_session_reports_no_data() {
        let s = session();
        let request = RunRequest::new("cls");
        assert_eq!(s.run(&request).unwrap().ready().map(|r| r.pruned_nodes), None);
        assert!(!s.cross_validate(&request, &CrossValidation::new(2)).unwrap().is_ready());
        assert!(!s.feature_table(&request).unwrap().is_ready());
    }

    #[test]
    fn one_sided_data_is_an_error() {
        let mut s = session();
        s.load_train(SEPARABLE).unwrap();
        assert!(matches!(
            s.run(&RunRequest::new("cls")),
            Err(TreeError::EmptyTestSet)
        ));
        let mut s = session();
        s.load_test(SEPARABLE).unwrap();
        assert!(matches!(
            s.run(&RunRequest::new("cls")),
            Err(TreeError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn run_on_identical_sets_is_exact() {
        let mut s = session();
        s.load_train(SEPARABLE).unwrap();
        s.load_test(SEPARABLE).unwrap();
        let request = RunRequest::from_strings("cls", "false", "2", "IG", ZeroDepth::RootOnly).unwrap();
        let report = s.run(&request).unwrap().ready().unwrap();
        assert!((report.evaluation.accuracy() - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.pruned_nodes, 0);
        assert_eq!(report.importance.rows()[0].attribute, "a");
    }

    #[test]
    fn load_failure_leaves_context_untouched() {
        let mut s = session();
        s.load_train(SEPARABLE).unwrap();
        assert!(s.load_train(["a:1"]).is_err());
        assert_eq!(s.train().len(), 4);
    }

    #[test]
    fn auto_split_takes_the_head() {
        let mut s = session();
        s.load_pooled(SEPARABLE).unwrap();
        assert_eq!(s.auto_split(0.75).unwrap(), (3, 1));
        assert_eq!(s.test()[0].id().as_str(), "3");
        assert!(matches!(
            s.auto_split(1.5),
            Err(TreeError::InvalidTrainRatio { .. })
        ));
    }

    #[test]
    fn sessions_are_independent() {
        let mut first = session();
        let second = session();
        first.load_pooled(SEPARABLE).unwrap();
        assert_eq!(first.pooled().len(), 4);
        assert!(second.pooled().is_empty());
    }

    #[test]
    fn from_strings_rejects_bad_inputs() {
        assert!(matches!(
            RunRequest::from_strings("cls", "maybe", "2", "IG", ZeroDepth::RootOnly),
            Err(TreeError::InvalidFlag { .. })
        ));
        assert!(matches!(
            RunRequest::from_strings("cls", "true", "-2", "IG", ZeroDepth::RootOnly),
            Err(TreeError::InvalidMaxDepth { .. })
        ));
        assert!(matches!(
            RunRequest::from_strings("cls", "true", "2", "C4.5", ZeroDepth::RootOnly),
            Err(TreeError::UnknownCriterion { .. })
        ));
        let request = RunRequest::from_strings("cls", "yes", "0", "gini", ZeroDepth::Unlimited).unwrap();
        assert_eq!(request.config().max_depth(), MaxDepth::Unlimited);
        assert!(request.config().pruning().is_some());
    }

    #[test]
    fn cross_validate_over_pool() {
        let mut s = session();
        s.load_pooled(SEPARABLE).unwrap();
        let result = s
            .cross_validate(&RunRequest::new("cls"), &CrossValidation::new(2))
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(result.folds.len(), 2);
    }
}
