use std::path::PathBuf;

/// Broad category of a [`TreeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A record string could not be parsed.
    Parse,
    /// The caller supplied an invalid or inconsistent configuration.
    Config,
    /// The data or the time budget did not allow the operation to finish.
    Runtime,
    /// Saving or loading a tree failed.
    Persistence,
}

/// Errors from record parsing, tree induction, evaluation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Returned when a token of a record line has no `:` separator.
    #[error("line {line}: token \"{token}\" has no ':' separator")]
    MalformedToken {
        /// Zero-based line index within the parsed batch.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// Returned when a token of a record line has an empty attribute name.
    #[error("line {line}: token \"{token}\" has an empty attribute name")]
    EmptyAttributeName {
        /// Zero-based line index within the parsed batch.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// Returned when the parser requires a target and a line lacks it.
    #[error("line {line}: target attribute \"{target}\" is missing")]
    MissingTarget {
        /// Zero-based line index within the parsed batch.
        line: usize,
        /// The required target attribute name.
        target: String,
    },

    /// Returned when no training record carries the target attribute.
    #[error("target attribute \"{target}\" does not occur in the records")]
    UnknownTarget {
        /// The requested target attribute name.
        target: String,
    },

    /// Returned when some, but not all, records carry the target attribute.
    #[error("record {record} has no value for target attribute \"{target}\"")]
    MissingTargetValue {
        /// Identifier of the offending record.
        record: String,
        /// The target attribute name.
        target: String,
    },

    /// Returned when a max-depth string is neither `unlimited` nor a non-negative integer.
    #[error("max depth must be \"unlimited\" or a non-negative integer, got \"{raw}\"")]
    InvalidMaxDepth {
        /// The raw value supplied.
        raw: String,
    },

    /// Returned when the fold count is zero or exceeds the pooled record count.
    #[error("fold count must be in [1, {n_records}], got {n_folds}")]
    InvalidFoldCount {
        /// The invalid fold count.
        n_folds: usize,
        /// Number of pooled records available.
        n_records: usize,
    },

    /// Returned when a split criterion name is not recognised.
    #[error("unknown split criterion \"{name}\" (expected InfoGain, GiniIndex or GainRatio)")]
    UnknownCriterion {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a tie-break rule name is not recognised.
    #[error("unknown tie-break rule \"{name}\" (expected lexicographic or first-seen)")]
    UnknownTieBreak {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a boolean-like string cannot be interpreted.
    #[error("expected a boolean flag (true/false, yes/no, 1/0), got \"{raw}\"")]
    InvalidFlag {
        /// The raw value supplied.
        raw: String,
    },

    /// Returned when the train ratio of an automatic split is outside [0, 1].
    #[error("train ratio must be in [0.0, 1.0], got {ratio}")]
    InvalidTrainRatio {
        /// The invalid ratio.
        ratio: f64,
    },

    /// Returned when the pruning hold-out fraction is outside (0, 1).
    #[error("hold-out fraction must be in (0.0, 1.0), got {fraction}")]
    InvalidHoldoutFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the cost-complexity parameter is negative or not finite.
    #[error("cost-complexity alpha must be finite and non-negative, got {alpha}")]
    InvalidAlpha {
        /// The invalid alpha.
        alpha: f64,
    },

    /// Returned when a tree is requested from zero training records.
    #[error("training set has zero records")]
    EmptyTrainingSet,

    /// Returned when a run has training data but nothing to evaluate.
    #[error("test set has zero records")]
    EmptyTestSet,

    /// Returned when tree construction overruns its configured deadline.
    #[error("tree construction exceeded its deadline of {budget_ms} ms after {elapsed_ms} ms")]
    DeadlineExceeded {
        /// The configured budget in milliseconds.
        budget_ms: u128,
        /// Time spent before the build was abandoned.
        elapsed_ms: u128,
    },

    /// Returned when tree serialization fails.
    #[error("failed to serialize tree")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when tree deserialization fails.
    #[error("failed to deserialize tree from {path}")]
    DeserializeModel {
        /// Path to the file that could not be decoded.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the tree file fails.
    #[error("failed to write tree to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the tree file fails.
    #[error("failed to read tree from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a tree with an incompatible format version.
    #[error("incompatible tree format version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the file.
        found: u32,
        /// Path to the offending file.
        path: PathBuf,
    },
}

impl TreeError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::MalformedToken { .. }
            | TreeError::EmptyAttributeName { .. }
            | TreeError::MissingTarget { .. } => ErrorKind::Parse,
            TreeError::UnknownTarget { .. }
            | TreeError::MissingTargetValue { .. }
            | TreeError::InvalidMaxDepth { .. }
            | TreeError::InvalidFoldCount { .. }
            | TreeError::UnknownCriterion { .. }
            | TreeError::UnknownTieBreak { .. }
            | TreeError::InvalidFlag { .. }
            | TreeError::InvalidTrainRatio { .. }
            | TreeError::InvalidHoldoutFraction { .. }
            | TreeError::InvalidAlpha { .. } => ErrorKind::Config,
            TreeError::EmptyTrainingSet
            | TreeError::EmptyTestSet
            | TreeError::DeadlineExceeded { .. } => ErrorKind::Runtime,
            TreeError::SerializeModel { .. }
            | TreeError::DeserializeModel { .. }
            | TreeError::WriteModel { .. }
            | TreeError::ReadModel { .. }
            | TreeError::IncompatibleModelVersion { .. } => ErrorKind::Persistence,
        }
    }
}
