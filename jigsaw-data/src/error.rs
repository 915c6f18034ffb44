//! Error types for the jigsaw-data crate.

use jigsaw_core::error::ConfigError;
use thiserror::Error;

/// Top-level error type for data pipeline operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema of dataset '{dataset}' not found")]
    SchemaLookup { dataset: String },

    #[error("Column '{column}' not found")]
    MissingColumn { column: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transformation error in '{dataset}.{file}': {message}")]
    Transformation {
        dataset: String,
        file: String,
        message: String,
    },

    #[error("Invariant violated in '{dataset}.{file}': {message}")]
    InvariantViolation {
        dataset: String,
        file: String,
        message: String,
    },

    #[error("Table is empty")]
    EmptyTable,

    #[error("Invalid number of splits: {0} (must be at least 2)")]
    InvalidSplits(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DataError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn schema_lookup(dataset: impl Into<String>) -> Self {
        Self::SchemaLookup {
            dataset: dataset.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transformation(
        dataset: impl Into<String>,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transformation {
            dataset: dataset.into(),
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn invariant(
        dataset: impl Into<String>,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            dataset: dataset.into(),
            file: file.into(),
            message: message.into(),
        }
    }

    /// Hard failures abort the whole run instead of excluding one file.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Config(_) | Self::InvariantViolation { .. }
        )
    }

    /// Attach dataset and file identity to an error raised without it.
    pub fn in_file(self, dataset: &str, file: &str) -> Self {
        match self {
            Self::Transformation { .. }
            | Self::InvariantViolation { .. }
            | Self::SchemaLookup { .. }
            | Self::Configuration(_)
            | Self::Config(_) => self,
            other => Self::transformation(dataset, file, other.to_string()),
        }
    }
}
