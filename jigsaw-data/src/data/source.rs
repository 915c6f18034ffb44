//! Data source abstraction: the boundary through which raw tables enter the pipeline.

use crate::data::table::Table;
use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Information about a data source for lineage tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
    pub row_count: Option<usize>,
}

/// Trait for loading a table from a source.
pub trait DataSource {
    /// Load the table, optionally limiting the number of rows.
    fn load(&self, limit: Option<usize>) -> Result<Table, DataError>;

    /// Return metadata about this source for lineage tracking.
    fn source_info(&self) -> DataSourceInfo;
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// Comma-separated file with one header row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for CsvSource {
    fn load(&self, limit: Option<usize>) -> Result<Table, DataError> {
        let table = Table::read_csv_limited(&self.path, limit)?;
        tracing::debug!(
            path = %self.path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Loaded CSV"
        );
        Ok(table)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Value;

    #[test]
    fn test_csv_source_load_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "body,rule\nfoo,r1\nbar,r2\nbaz,r1\n").unwrap();

        let source = CsvSource::new(&path);
        let all = source.load(None).unwrap();
        assert_eq!(all.row_count(), 3);

        let head = source.load(Some(2)).unwrap();
        assert_eq!(head.row_count(), 2);
        assert_eq!(head.rows[1][0], Value::from("bar"));
    }

    #[test]
    fn test_csv_source_quoted_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "body,label\n\"hello, world\",1\n").unwrap();

        let table = CsvSource::new(&path).load(None).unwrap();
        assert_eq!(table.columns, vec!["body", "label"]);
        assert_eq!(table.rows[0][0], Value::from("hello, world"));
        assert_eq!(table.rows[0][1], Value::Int(1));
    }

    #[test]
    fn test_csv_source_missing_file() {
        let source = CsvSource::new("/nonexistent/train.csv");
        assert!(source.load(None).is_err());
        assert_eq!(source.source_info().source_type, "csv");
    }
}
