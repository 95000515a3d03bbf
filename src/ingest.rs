//! Batch intake from CSV files.
//!
//! Rows are parsed as text and handed to the feature pipeline untouched; a
//! missing model column is reported there, not while reading the file.

use crate::error::{PipelineError, Result};
use crate::types::application::{FieldValue, RawRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Whether `filename` carries one of the allowed extensions (case-insensitive).
pub fn allowed_file(filename: &str, allowed_extensions: &[String]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Parsed CSV file: original headers and cell text, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvBatch {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvBatch {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PipelineError::Csv(e.into()))?;
        let batch = Self::from_reader(file)?;
        debug!(path = %path.display(), rows = batch.len(), "CSV batch parsed");
        Ok(batch)
    }

    /// Parse CSV with a header row. Every row must have as many cells as the header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(str::to_string).collect())
                    .map_err(PipelineError::from)
            })
            .collect::<Result<Vec<Vec<String>>>>()?;

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records keyed by canonical field name, one per row.
    pub fn records(&self) -> Vec<RawRecord> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    fn record(&self, row: &[String]) -> RawRecord {
        self.headers
            .iter()
            .zip(row)
            .map(|(header, cell)| (header.as_str(), FieldValue::from_cell(cell)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    const SAMPLE: &str = "\
jenis_kelamin,pemilik_mobil,usia,pendapatan_tahunan
F,N,35,50000.0
M,Y,,120000
";

    #[test]
    fn test_allowed_file() {
        let allowed = vec!["csv".to_string()];
        assert!(allowed_file("applications.csv", &allowed));
        assert!(allowed_file("APPLICATIONS.CSV", &allowed));
        assert!(!allowed_file("applications.xlsx", &allowed));
        assert!(!allowed_file("csv", &allowed));
    }

    #[test]
    fn test_parse_keeps_order_and_headers() {
        let batch = CsvBatch::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.headers()[0], "jenis_kelamin");
        assert_eq!(batch.rows()[1][0], "M");
    }

    #[test]
    fn test_records_use_canonical_names() {
        let records = CsvBatch::from_reader(SAMPLE.as_bytes()).unwrap().records();
        assert_eq!(records[0].get(schema::GENDER), Some(&FieldValue::from("F")));
        assert_eq!(records[0].get(schema::AGE), Some(&FieldValue::from("35")));
        assert!(records[1].get(schema::AGE).unwrap().is_missing());
        // columns absent from the file are simply absent from the record
        assert_eq!(records[0].get(schema::HOUSING_TYPE), None);
    }

    #[test]
    fn test_header_only_file_is_empty_batch() {
        let batch = CsvBatch::from_reader("usia,anak\n".as_bytes()).unwrap();
        assert!(batch.is_empty());
        assert!(batch.records().is_empty());
    }

    #[test]
    fn test_completely_empty_file() {
        let batch = CsvBatch::from_reader("".as_bytes()).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = CsvBatch::from_reader("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let batch = CsvBatch::from_path(&path).unwrap();
        assert_eq!(batch.len(), 2);
    }
}
