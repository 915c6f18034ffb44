//! Schema validation: split every declared file into valid and invalid parts.
//!
//! Checks run in a fixed order on train and test files:
//! `missing_columns`, `dtype_mismatch`, `data_redundancy`, `missing_rows`.
//! The first two are hard checks: a failure marks the file invalid and skips
//! the rest. The last two are warnings: the affected rows move to the invalid
//! subset and the remaining rows stay valid.

use crate::data::schema::{DataSchema, FileRole, SchemaRegistry};
use crate::data::source::{CsvSource, DataSource};
use crate::data::table::{ColumnType, Table};
use crate::error::DataError;
use crate::report::{CheckResult, CheckStatus, FileChecks, StatusReport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const VALID_DIR: &str = "valid_data";
pub const INVALID_DIR: &str = "invalid_data";
pub const REPORT_DIR: &str = "report";
pub const REPORT_FILE: &str = "status.json";

pub const MISSING_COLUMNS: &str = "missing_columns";
pub const DTYPE_MISMATCH: &str = "dtype_mismatch";
pub const DATA_REDUNDANCY: &str = "data_redundancy";
pub const MISSING_ROWS: &str = "missing_rows";
pub const SUBMISSION_COUNT: &str = "submission_count";
pub const LOAD: &str = "load";

/// A declared column whose inferred type falls outside its declared family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub column: String,
    pub dtype: String,
    pub found: ColumnType,
}

/// Result of validating one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Rows (and columns) that passed; `None` when the file failed outright.
    pub valid: Option<Table>,
    /// Rows or columns split off by the checks; `None` when nothing was removed.
    pub invalid: Option<Table>,
    pub checks: FileChecks,
    pub passed: bool,
}

fn purity(raw_count: usize, removed: usize) -> f64 {
    if raw_count == 0 {
        return 100.0;
    }
    let pct = 100.0 * (raw_count - removed) as f64 / raw_count as f64;
    (pct * 10_000.0).round() / 10_000.0
}

fn skip_remaining(checks: &mut FileChecks, from: usize) {
    for check in &[MISSING_COLUMNS, DTYPE_MISMATCH, DATA_REDUNDANCY, MISSING_ROWS][from..] {
        checks.insert(check.to_string(), CheckResult::skipped(serde_json::Value::Null));
    }
}

/// Validate a train or test table against its schema.
///
/// Pure in `(table, schema, role)`: validating the same input twice gives the
/// same outcome.
pub fn validate_table(table: &Table, schema: &DataSchema, role: FileRole) -> ValidationOutcome {
    let mut checks = FileChecks::new();
    let required = schema.required_columns(role);

    // missing_columns
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        checks.insert(MISSING_COLUMNS.into(), CheckResult::failed(json!(missing)));
        skip_remaining(&mut checks, 1);
        return ValidationOutcome {
            valid: None,
            invalid: Some(table.clone()),
            checks,
            passed: false,
        };
    }
    checks.insert(MISSING_COLUMNS.into(), CheckResult::passed(json!([])));

    // dtype_mismatch
    let mut mismatches = Vec::new();
    for col in &required {
        let declared = schema.columns[*col];
        // Column presence was checked above.
        let found = table.column_type(col).unwrap_or(ColumnType::Null);
        if !declared.accepts(found) {
            mismatches.push(TypeMismatch {
                column: col.to_string(),
                dtype: declared.to_string(),
                found,
            });
        }
    }
    if !mismatches.is_empty() {
        let columns: Vec<&str> = mismatches.iter().map(|m| m.column.as_str()).collect();
        let invalid = table.select(&columns).ok();
        checks.insert(DTYPE_MISMATCH.into(), CheckResult::failed(json!(mismatches)));
        skip_remaining(&mut checks, 2);
        return ValidationOutcome {
            valid: None,
            invalid,
            checks,
            passed: false,
        };
    }
    checks.insert(DTYPE_MISMATCH.into(), CheckResult::passed(json!([])));

    let features: Vec<&str> = schema.features.iter().map(String::as_str).collect();
    let mut valid = table.clone();
    let mut removed: Vec<Table> = Vec::new();

    // data_redundancy
    let raw_count = valid.row_count();
    let subset = (!features.is_empty()).then_some(features.as_slice());
    let duplicates = valid.duplicate_rows(subset).unwrap_or_default();
    let detail = json!({
        "raw_count": raw_count,
        "n_duplicates": duplicates.len(),
        "purity": purity(raw_count, duplicates.len()),
    });
    if duplicates.is_empty() {
        checks.insert(DATA_REDUNDANCY.into(), CheckResult::passed(detail));
    } else {
        checks.insert(DATA_REDUNDANCY.into(), CheckResult::warning(detail));
        let (kept, dropped) = valid.partition_rows(&duplicates);
        valid = kept;
        removed.push(dropped);
    }

    // missing_rows
    let raw_count = valid.row_count();
    let feature_idx: Vec<usize> = features
        .iter()
        .filter_map(|f| valid.column_index(f))
        .collect();
    let incomplete: Vec<usize> = valid
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| feature_idx.iter().any(|&i| row[i].is_null()))
        .map(|(i, _)| i)
        .collect();
    let detail = json!({
        "raw_count": raw_count,
        "n_missing": incomplete.len(),
        "purity": purity(raw_count, incomplete.len()),
    });
    if incomplete.is_empty() {
        checks.insert(MISSING_ROWS.into(), CheckResult::passed(detail));
    } else {
        checks.insert(MISSING_ROWS.into(), CheckResult::warning(detail));
        let (kept, dropped) = valid.partition_rows(&incomplete);
        valid = kept;
        removed.push(dropped);
    }

    ValidationOutcome {
        valid: Some(valid),
        invalid: (!removed.is_empty()).then(|| Table::concat(removed)),
        checks,
        passed: true,
    }
}

/// Test file a submission file is checked against: `sample_submission.csv` -> `test.csv`.
pub fn matching_test_file(submission: &str) -> String {
    match submission.split_once('.') {
        Some((_, ext)) => format!("test.{ext}"),
        None => "test".to_string(),
    }
}

/// Where the validation stage put its outputs.
#[derive(Debug, Clone)]
pub struct ValidationArtifact {
    pub valid_dir: PathBuf,
    pub invalid_dir: PathBuf,
    pub report_path: PathBuf,
    pub report: StatusReport,
}

/// Runs [`validate_table`] over every declared file of every dataset.
pub struct ValidationStage<'a> {
    registry: &'a SchemaRegistry,
    input_dir: PathBuf,
}

impl<'a> ValidationStage<'a> {
    pub fn new(registry: &'a SchemaRegistry, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            input_dir: input_dir.into(),
        }
    }

    /// Validate and write `valid_data/`, `invalid_data/` and `report/status.json` under `output_root`.
    pub fn run(&self, output_root: &Path) -> Result<ValidationArtifact, DataError> {
        let valid_dir = output_root.join(VALID_DIR);
        let invalid_dir = output_root.join(INVALID_DIR);
        let report_path = output_root.join(REPORT_DIR).join(REPORT_FILE);
        let mut report = StatusReport::new();

        for (name, schema) in self.registry.iter() {
            tracing::info!(dataset = name, "Validating dataset");
            let mut valid_counts: HashMap<String, usize> = HashMap::new();

            for role in [FileRole::Train, FileRole::Test] {
                for file in schema.files(role).iter().filter(|f| f.ends_with(".csv")) {
                    let source = CsvSource::new(self.input_dir.join(name).join(file));
                    let table = match source.load(None) {
                        Ok(table) => table,
                        Err(e) => {
                            tracing::error!(dataset = name, file = %file, error = %e, "Failed to load file");
                            report.fail_file(name, file, LOAD, e.to_string());
                            continue;
                        }
                    };

                    let outcome = validate_table(&table, schema, role);
                    log_outcome(name, file, &outcome);

                    if let Some(valid) = &outcome.valid {
                        valid.write_csv(&valid_dir.join(name).join(file))?;
                        valid_counts.insert(file.clone(), valid.row_count());
                    }
                    if let Some(invalid) = &outcome.invalid {
                        invalid.write_csv(&invalid_dir.join(name).join(file))?;
                    }
                    let failed_check = outcome
                        .checks
                        .iter()
                        .find(|(_, r)| r.status == CheckStatus::Failed)
                        .map(|(c, _)| c.clone());
                    report.record_all(name, file, outcome.checks);
                    if let Some(check) = failed_check {
                        report.push_failure(
                            name,
                            file,
                            &check,
                            format!("Invalid file {name}.{file}: {check} failed"),
                        );
                    }
                }
            }

            for file in schema
                .files(FileRole::Submission)
                .iter()
                .filter(|f| f.ends_with(".csv"))
            {
                self.validate_submission(name, file, &valid_counts, &valid_dir, &invalid_dir, &mut report)?;
            }
        }

        report.save(&report_path)?;
        tracing::info!(
            passed = report.validation_status,
            failures = report.failures.len(),
            report = %report_path.display(),
            "Validation finished"
        );

        Ok(ValidationArtifact {
            valid_dir,
            invalid_dir,
            report_path,
            report,
        })
    }

    fn validate_submission(
        &self,
        dataset: &str,
        file: &str,
        valid_counts: &HashMap<String, usize>,
        valid_dir: &Path,
        invalid_dir: &Path,
        report: &mut StatusReport,
    ) -> Result<(), DataError> {
        let table = match CsvSource::new(self.input_dir.join(dataset).join(file)).load(None) {
            Ok(table) => table,
            Err(e) => {
                report.fail_file(dataset, file, LOAD, e.to_string());
                return Ok(());
            }
        };

        let test_file = matching_test_file(file);
        let expected = valid_counts.get(&test_file).copied();
        let detail = json!({
            "test_file": &test_file,
            "expected": expected,
            "found": table.row_count(),
        });

        if expected == Some(table.row_count()) {
            table.write_csv(&valid_dir.join(dataset).join(file))?;
            report.record(dataset, file, SUBMISSION_COUNT, CheckResult::passed(detail));
        } else {
            tracing::error!(
                dataset,
                file,
                expected = ?expected,
                found = table.row_count(),
                "Submission row count does not match test file"
            );
            table.write_csv(&invalid_dir.join(dataset).join(file))?;
            report.record(dataset, file, SUBMISSION_COUNT, CheckResult::failed(detail));
            report.push_failure(
                dataset,
                file,
                SUBMISSION_COUNT,
                format!("Submission {dataset}.{file} does not match {test_file}"),
            );
        }
        Ok(())
    }
}

fn log_outcome(dataset: &str, file: &str, outcome: &ValidationOutcome) {
    for (check, result) in &outcome.checks {
        match result.status {
            CheckStatus::Failed => {
                tracing::error!(dataset, file, check = %check, detail = %result.detail, "Validation check failed")
            }
            CheckStatus::Warning => {
                tracing::warn!(dataset, file, check = %check, detail = %result.detail, "Validation warning")
            }
            CheckStatus::Passed | CheckStatus::Skipped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Value;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
jigsaw:
  columns: { body: str, rule: str, rule_violation: int }
  features: [body, rule]
  target: rule_violation
  train: [train.csv]
  test: [test.csv]
  submission: [sample_submission.csv]
"#;

    fn schema() -> DataSchema {
        SchemaRegistry::from_yaml_str(YAML)
            .unwrap()
            .get("jigsaw")
            .unwrap()
            .clone()
    }

    fn row(body: Option<&str>, rule: &str, label: i64) -> Vec<Value> {
        vec![
            body.map(Value::from).unwrap_or(Value::Null),
            Value::from(rule),
            Value::Int(label),
        ]
    }

    fn train_table() -> Table {
        Table::new(
            vec!["body".into(), "rule".into(), "rule_violation".into()],
            vec![
                row(Some("a"), "r1", 1),
                row(Some("b"), "r1", 0),
                row(Some("a"), "r1", 0),
                row(None, "r2", 1),
                row(Some("c"), "r2", 0),
            ],
        )
    }

    #[test]
    fn test_clean_split_of_warnings() {
        let outcome = validate_table(&train_table(), &schema(), FileRole::Train);
        assert!(outcome.passed);

        let valid = outcome.valid.unwrap();
        assert_eq!(valid.row_count(), 3);
        assert_eq!(outcome.invalid.unwrap().row_count(), 2);

        let redundancy = &outcome.checks[DATA_REDUNDANCY];
        assert_eq!(redundancy.status, CheckStatus::Warning);
        assert_eq!(redundancy.detail["n_duplicates"], 1);
        assert_eq!(redundancy.detail["purity"], 80.0);

        let missing = &outcome.checks[MISSING_ROWS];
        assert_eq!(missing.detail["raw_count"], 4);
        assert_eq!(missing.detail["n_missing"], 1);
    }

    #[test]
    fn test_missing_columns_fail_the_file() {
        let table = train_table().drop_columns(&["rule"]);
        let outcome = validate_table(&table, &schema(), FileRole::Train);
        assert!(!outcome.passed);
        assert!(outcome.valid.is_none());
        assert_eq!(outcome.checks[MISSING_COLUMNS].detail, json!(["rule"]));
        assert_eq!(outcome.checks[MISSING_ROWS].status, CheckStatus::Skipped);
    }

    #[test]
    fn test_target_not_required_for_test_files() {
        let table = train_table().drop_columns(&["rule_violation"]);
        let outcome = validate_table(&table, &schema(), FileRole::Test);
        assert!(outcome.passed);
    }

    #[test]
    fn test_dtype_mismatch_splits_columns() {
        let table = Table::new(
            vec!["body".into(), "rule".into(), "rule_violation".into()],
            vec![vec![Value::from("x"), Value::from("r"), Value::from("yes")]],
        );
        let outcome = validate_table(&table, &schema(), FileRole::Train);
        assert!(!outcome.passed);
        assert_eq!(outcome.invalid.unwrap().columns, vec!["rule_violation"]);
        assert_eq!(outcome.checks[DTYPE_MISMATCH].detail[0]["found"], "string");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let s = schema();
        let first = validate_table(&train_table(), &s, FileRole::Train);
        let second = validate_table(&train_table(), &s, FileRole::Train);
        assert_eq!(first, second);

        let again = validate_table(first.valid.as_ref().unwrap(), &s, FileRole::Train);
        assert!(again.invalid.is_none());
        assert_eq!(again.checks[DATA_REDUNDANCY].detail["purity"], 100.0);
    }

    #[test]
    fn test_matching_test_file() {
        assert_eq!(matching_test_file("sample_submission.csv"), "test.csv");
        assert_eq!(matching_test_file("submission"), "test");
    }

    #[test]
    fn test_stage_writes_trees_and_report() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let ds = input.path().join("jigsaw");
        std::fs::create_dir_all(&ds).unwrap();
        train_table().write_csv(&ds.join("train.csv")).unwrap();
        std::fs::write(ds.join("test.csv"), "body,rule\nq,r1\nw,r2\n").unwrap();
        std::fs::write(ds.join("sample_submission.csv"), "row_id,rule_violation\n1,0\n").unwrap();

        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let artifact = ValidationStage::new(&registry, input.path())
            .run(output.path())
            .unwrap();

        assert!(artifact.valid_dir.join("jigsaw/train.csv").exists());
        assert!(artifact.invalid_dir.join("jigsaw/train.csv").exists());
        assert!(artifact.valid_dir.join("jigsaw/test.csv").exists());
        // One submission row against two test rows.
        assert!(artifact.invalid_dir.join("jigsaw/sample_submission.csv").exists());
        assert_eq!(
            artifact
                .report
                .get("jigsaw", "sample_submission.csv", SUBMISSION_COUNT)
                .unwrap()
                .status,
            CheckStatus::Failed
        );
        assert!(!artifact.report.validation_status);
        assert!(artifact.report_path.exists());
    }
}
