//! Durable record of what passed and failed, per dataset, file and check.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::DataError;

/// Outcome of one check or stage on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl CheckResult {
    pub fn passed(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Passed,
            detail,
        }
    }

    pub fn warning(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Warning,
            detail,
        }
    }

    pub fn failed(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Failed,
            detail,
        }
    }

    pub fn skipped(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Skipped,
            detail,
        }
    }
}

/// A file or dataset that was excluded from the outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub dataset: String,
    /// `None` when the whole dataset was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub stage: String,
    pub message: String,
}

/// Checks per file (`check name -> result`), in name order.
pub type FileChecks = BTreeMap<String, CheckResult>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub datasets: BTreeMap<String, BTreeMap<String, FileChecks>>,
    pub failures: Vec<Failure>,
    pub validation_status: bool,
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            datasets: BTreeMap::new(),
            failures: Vec::new(),
            validation_status: true,
        }
    }
}

impl StatusReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check result. A failed check clears `validation_status`.
    pub fn record(&mut self, dataset: &str, file: &str, check: &str, result: CheckResult) {
        if result.status == CheckStatus::Failed {
            self.validation_status = false;
        }
        self.datasets
            .entry(dataset.to_string())
            .or_default()
            .entry(file.to_string())
            .or_default()
            .insert(check.to_string(), result);
    }

    /// Merge the checks of one file validated on its own.
    pub fn record_all(&mut self, dataset: &str, file: &str, checks: FileChecks) {
        for (check, result) in checks {
            self.record(dataset, file, &check, result);
        }
    }

    pub fn fail_file(&mut self, dataset: &str, file: &str, stage: &str, message: impl Into<String>) {
        let message = message.into();
        self.record(
            dataset,
            file,
            stage,
            CheckResult::failed(serde_json::json!({ "error": message })),
        );
        self.failures.push(Failure {
            dataset: dataset.to_string(),
            file: Some(file.to_string()),
            stage: stage.to_string(),
            message,
        });
    }

    /// List a file as excluded when its failing check was already recorded.
    pub fn push_failure(&mut self, dataset: &str, file: &str, stage: &str, message: impl Into<String>) {
        self.validation_status = false;
        self.failures.push(Failure {
            dataset: dataset.to_string(),
            file: Some(file.to_string()),
            stage: stage.to_string(),
            message: message.into(),
        });
    }

    pub fn fail_dataset(&mut self, dataset: &str, stage: &str, message: impl Into<String>) {
        self.validation_status = false;
        self.failures.push(Failure {
            dataset: dataset.to_string(),
            file: None,
            stage: stage.to_string(),
            message: message.into(),
        });
    }

    pub fn get(&self, dataset: &str, file: &str, check: &str) -> Option<&CheckResult> {
        self.datasets.get(dataset)?.get(file)?.get(check)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        jigsaw_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>, DataError> {
        Ok(jigsaw_core::persistence::load_json(path)?)
    }
}
