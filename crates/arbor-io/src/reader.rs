//! CSV reader that encodes every row as an `attr:value` record line.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;

/// Reads a headed CSV file into record lines.
///
/// The header names the attributes. Each data row becomes one line of
/// `name:value` tokens joined by `,`, in column order. Empty cells are left
/// out so the attribute is missing on that record.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::NoColumns`] | Header row is missing or empty |
/// | [`IoError::BlankHeader`] | A header cell is blank |
/// | [`IoError::ReservedCharacter`] | A header contains `,` or `:`, or a cell contains `,` |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
pub struct CsvRecordReader {
    path: PathBuf,
}

impl CsvRecordReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning one record line per row.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<String>, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        if header.is_empty() || header.iter().all(str::is_empty) {
            return Err(IoError::NoColumns {
                path: self.path.clone(),
            });
        }
        for (column, name) in header.iter().enumerate() {
            if name.is_empty() {
                return Err(IoError::BlankHeader {
                    path: self.path.clone(),
                    column,
                });
            }
            self.check_reserved(1, name, &[',', ':'])?;
        }
        let expected = header.len();
        debug!(expected_cols = expected, "read CSV header");

        let mut lines = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            if record.len() != expected {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected,
                    got: record.len(),
                });
            }

            let mut tokens = Vec::with_capacity(expected);
            for (name, cell) in header.iter().zip(record.iter()) {
                if cell.is_empty() {
                    continue;
                }
                // the record parser splits on the first `:` only
                self.check_reserved(row_index + 2, cell, &[','])?;
                tokens.push(format!("{name}:{cell}"));
            }
            lines.push(tokens.join(","));
        }

        if lines.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(n_records = lines.len(), n_columns = expected, "records loaded");
        Ok(lines)
    }

    fn check_reserved(&self, line: usize, value: &str, reserved: &[char]) -> Result<(), IoError> {
        if value.contains(reserved) {
            return Err(IoError::ReservedCharacter {
                path: self.path.clone(),
                line,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn rows_become_record_lines() {
        let f = write_csv("outlook,temp,play\nsunny,85,no\nrain,70,yes\n");
        let lines = CsvRecordReader::new(f.path()).read().unwrap();
        assert_eq!(lines, vec!["outlook:sunny,temp:85,play:no", "outlook:rain,temp:70,play:yes"]);
    }

    #[test]
    fn empty_cells_are_omitted() {
        let f = write_csv("a,b,cls\n1,,x\n,2,y\n");
        let lines = CsvRecordReader::new(f.path()).read().unwrap();
        assert_eq!(lines, vec!["a:1,cls:x", "b:2,cls:y"]);
    }

    #[test]
    fn cells_are_trimmed() {
        let f = write_csv("a , cls\n 1 , x \n");
        let lines = CsvRecordReader::new(f.path()).read().unwrap();
        assert_eq!(lines, vec!["a:1,cls:x"]);
    }

    #[test]
    fn quoted_comma_is_reserved() {
        let f = write_csv("a,cls\n\"1,5\",x\n");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::ReservedCharacter { line: 2, .. })));
    }

    #[test]
    fn colon_in_cell_is_kept() {
        let f = write_csv("time,cls
12:30,x
");
        let lines = CsvRecordReader::new(f.path()).read().unwrap();
        assert_eq!(lines, vec!["time:12:30,cls:x"]);
    }

    #[test]
    fn colon_in_header_is_reserved() {
        let f = write_csv("time:of:day,cls\n1,x\n");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::ReservedCharacter { line: 1, .. })));
    }

    #[test]
    fn error_file_not_found() {
        let result = CsvRecordReader::new(Path::new("/nonexistent/file.csv")).read();
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("a,b,cls\n");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_no_columns() {
        let f = write_csv("");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::NoColumns { .. })));
    }

    #[test]
    fn error_blank_header() {
        let f = write_csv("a,,cls\n1,2,x\n");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::BlankHeader { column: 1, .. })));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let f = write_csv("a,b,cls\n1,2,x\n1,2\n");
        let result = CsvRecordReader::new(f.path()).read();
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength { row_index: 1, expected: 3, got: 2, .. })
        ));
    }
}
