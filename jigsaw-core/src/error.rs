//! Error types for the Jigsaw core library.
//!
//! Configuration problems are reported before any dataset file is touched, so
//! everything here is fatal for the run that raised it.

use std::path::PathBuf;

/// Errors from loading or validating the pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Errors from creating the per-run artifact tree.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to create run directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run directory already exists: {path}")]
    AlreadyExists { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid() {
        let err = ConfigError::invalid("n_splits must be at least 2");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: n_splits must be at least 2"
        );
    }

    #[test]
    fn test_error_display_missing() {
        let err = ConfigError::missing("triplet.anchor_column");
        assert_eq!(
            err.to_string(),
            "Missing required field: triplet.anchor_column"
        );
    }

    #[test]
    fn test_error_display_run_exists() {
        let err = RunError::AlreadyExists {
            path: PathBuf::from("artifacts/20250101_000000"),
        };
        assert!(err.to_string().contains("20250101_000000"));
    }
}
