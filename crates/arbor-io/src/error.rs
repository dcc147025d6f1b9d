//! I/O error types for arbor-io.

use std::path::PathBuf;

/// Failures at the file boundary: reading CSV input, writing JSON results.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The input CSV could not be opened.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Input path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The csv crate rejected a record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset of the bad record.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// The header row is missing or names no columns.
    #[error("no columns in header of {path}")]
    NoColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// A header cell is blank and cannot name an attribute.
    #[error("blank column name in {path} at column {column}")]
    BlankHeader {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based column index.
        column: usize,
    },

    /// The file has a header and no data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// A data row is wider or narrower than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based data row, header not counted.
        row_index: usize,
        /// Header width.
        expected: usize,
        /// Width of the offending row.
        got: usize,
    },

    /// A header holds `,` or `:`, or a cell holds `,`; record lines reserve them.
    #[error("reserved character in {path} at line {line}: \"{value}\"")]
    ReservedCharacter {
        /// Path to the CSV file.
        path: PathBuf,
        /// One-based CSV line, the header being line 1.
        line: usize,
        /// The offending header or cell.
        value: String,
    },

    /// The experiment name would not make a safe file-name prefix.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// Rejected name.
        name: String,
    },

    /// `create_dir_all` failed for the output directory.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// serde_json could not encode an artifact.
    #[error("cannot encode {path} as JSON")]
    SerializeJson {
        /// Destination path of the artifact.
        path: PathBuf,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// An artifact file could not be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
