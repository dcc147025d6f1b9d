//! File I/O for arbor: CSV files in, JSON result artifacts out.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{
    ClassMetricsEntry, CvSummary, ExperimentName, FoldEntry, ImportanceEntry, RunSummary,
    TreeNodeEntry,
};
pub use error::IoError;
pub use reader::CsvRecordReader;
pub use writer::ResultWriter;
