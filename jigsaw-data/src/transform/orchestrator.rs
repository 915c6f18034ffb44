//! Per-dataset composition of the enabled stages and the combined artifacts.
//!
//! For every train and test file of every dataset the enabled stages run in
//! [`Stage::ALL`] order. A failing file is recorded and left out of the
//! combined tables; a structural failure aborts the run. Datasets without a
//! schema are skipped and recorded.

use super::cleaning::remove_duplicates;
use super::folding::{assign_folds, resolve_request};
use super::pairwise::expand_pairs;
use super::triplet::{build_triplets, check_triplet_columns};
use super::zeroshot::zero_shot_transform;
use super::{FOLD_COLUMN, Stage, StageContext};
use crate::data::lineage::{FileLineage, LineageManifest, StageRecord};
use crate::data::schema::{FileRole, SchemaRegistry};
use crate::data::source::{CsvSource, DataSource};
use crate::data::table::{Table, Value};
use crate::error::DataError;
use crate::report::{CheckResult, StatusReport};
use jigsaw_core::PipelineConfig;
use rand::Rng;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const STATUS_FILE: &str = "status.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const TRANSFORMED_CHECK: &str = "transformed";

/// Paths and records produced by one transformation run.
#[derive(Debug, Clone)]
pub struct TransformationArtifact {
    pub output_root: PathBuf,
    pub final_dir: String,
    pub combined_dir: PathBuf,
    /// `None` when no file of that role survived.
    pub train_file: Option<PathBuf>,
    pub valid_file: Option<PathBuf>,
    pub test_file: Option<PathBuf>,
    pub report_path: PathBuf,
    pub manifest_path: PathBuf,
    pub report: StatusReport,
    pub lineage: LineageManifest,
}

/// Enabled stages of a run and the directory naming derived from them.
pub struct TransformationPipeline<'a> {
    config: &'a PipelineConfig,
    registry: &'a SchemaRegistry,
    stages: Vec<Stage>,
    final_dir: String,
}

impl<'a> TransformationPipeline<'a> {
    pub fn new(config: &'a PipelineConfig, registry: &'a SchemaRegistry) -> Self {
        let stages: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|stage| match stage {
                Stage::Cleaned => true,
                Stage::ZeroShot => config.zero_shot,
                Stage::Folded => config.splitter.is_some(),
                Stage::Triplet => config.triplet.is_some(),
                Stage::Pairwise => config.pairwise && config.triplet.is_some(),
            })
            .collect();
        let final_dir = stages
            .iter()
            .map(|s| s.tag())
            .collect::<Vec<_>>()
            .join("_");
        Self {
            config,
            registry,
            stages,
            final_dir,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn final_dir(&self) -> &str {
        &self.final_dir
    }

    /// Transform every dataset under `input_root` into `output_root`.
    pub fn run<R: Rng + ?Sized>(
        &self,
        input_root: &Path,
        output_root: &Path,
        rng: &mut R,
    ) -> Result<TransformationArtifact, DataError> {
        tracing::info!(
            input = %input_root.display(),
            output = %output_root.display(),
            final_dir = %self.final_dir,
            "Starting transformation"
        );

        self.check_triplet_config()?;

        let mut report = StatusReport::new();
        let mut lineage = LineageManifest::new(self.config.seed, &self.final_dir);
        let mut train_tables = Vec::new();
        let mut test_tables = Vec::new();

        for dataset in self.dataset_names(input_root)? {
            let schema = match self.registry.get(&dataset) {
                Ok(schema) => schema,
                Err(e) => {
                    tracing::error!(dataset = %dataset, error = %e, "Skipping dataset");
                    report.fail_dataset(&dataset, "schema_lookup", e.to_string());
                    continue;
                }
            };

            let mut attempted = 0usize;
            let mut succeeded = 0usize;
            for role in [FileRole::Train, FileRole::Test] {
                for file in schema.files(role).iter().filter(|f| f.ends_with(".csv")) {
                    attempted += 1;
                    let ctx = StageContext {
                        dataset: &dataset,
                        file,
                        role,
                        schema,
                    };
                    let Some((table, file_lineage)) =
                        self.transform_file(&ctx, input_root, output_root, rng, &mut report)?
                    else {
                        continue;
                    };

                    succeeded += 1;
                    lineage.files.push(file_lineage);
                    match role {
                        FileRole::Train => train_tables.push(table),
                        _ => test_tables.push(table),
                    }
                }
            }

            if attempted > 0 && succeeded == 0 {
                tracing::error!(dataset = %dataset, "Every file of the dataset failed");
                report.fail_dataset(&dataset, "transform", "every file of the dataset failed");
            }
        }

        let combined_dir = output_root.join(format!("{}_combined", self.final_dir));
        let (train_file, valid_file) = if train_tables.is_empty() {
            (None, None)
        } else {
            let train = Table::concat(train_tables);
            let valid = self.valid_rows(&train);
            let train_path = combined_dir.join("train.csv");
            let valid_path = combined_dir.join("valid.csv");
            train.write_csv(&train_path)?;
            valid.write_csv(&valid_path)?;
            tracing::info!(
                train_rows = train.row_count(),
                valid_rows = valid.row_count(),
                "Wrote combined train and valid files"
            );
            (Some(train_path), Some(valid_path))
        };
        let test_file = if test_tables.is_empty() {
            None
        } else {
            let test = Table::concat(test_tables);
            let test_path = combined_dir.join("test.csv");
            test.write_csv(&test_path)?;
            tracing::info!(test_rows = test.row_count(), "Wrote combined test file");
            Some(test_path)
        };

        let report_path = output_root.join(STATUS_FILE);
        let manifest_path = output_root.join(MANIFEST_FILE);
        report.save(&report_path)?;
        lineage.save(&manifest_path)?;

        tracing::info!(
            files = lineage.files.len(),
            failures = report.failures.len(),
            "Transformation finished"
        );

        Ok(TransformationArtifact {
            output_root: output_root.to_path_buf(),
            final_dir: self.final_dir.clone(),
            combined_dir,
            train_file,
            valid_file,
            test_file,
            report_path,
            manifest_path,
            report,
            lineage,
        })
    }

    /// Reject triplet columns that a single-target schema does not list as features.
    fn check_triplet_config(&self) -> Result<(), DataError> {
        let Some(triplet) = &self.config.triplet else {
            return Ok(());
        };
        for (name, schema) in self.registry.iter() {
            if schema.target_columns().len() == 1 {
                check_triplet_columns(name, schema, triplet)?;
            }
        }
        Ok(())
    }

    /// Registry datasets followed by input directories the registry does not know.
    fn dataset_names(&self, input_root: &Path) -> Result<Vec<String>, DataError> {
        let mut names: Vec<String> = self.registry.names().map(String::from).collect();
        let mut extra = BTreeSet::new();
        if input_root.is_dir() {
            for entry in std::fs::read_dir(input_root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if !names.contains(&name) {
                        extra.insert(name);
                    }
                }
            }
        }
        names.extend(extra);
        Ok(names)
    }

    /// Run the enabled stages on one file and write its output.
    ///
    /// Returns `Ok(None)` when the file failed softly; the failure is in `report`.
    fn transform_file<R: Rng + ?Sized>(
        &self,
        ctx: &StageContext<'_>,
        input_root: &Path,
        output_root: &Path,
        rng: &mut R,
        report: &mut StatusReport,
    ) -> Result<Option<(Table, FileLineage)>, DataError> {
        let path = input_root.join(ctx.dataset).join(ctx.file);
        if !path.is_file() {
            tracing::error!(
                dataset = ctx.dataset,
                file = ctx.file,
                path = %path.display(),
                "File not present in validated input"
            );
            report.fail_file(ctx.dataset, ctx.file, "load", "file not present in validated input");
            return Ok(None);
        }

        let source = CsvSource::new(&path);
        let mut file_lineage = FileLineage::new(ctx.dataset, ctx.file, source.source_info());
        let mut table = match source.load(None) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(dataset = ctx.dataset, file = ctx.file, error = %e, "Failed to load file");
                report.fail_file(ctx.dataset, ctx.file, "load", e.to_string());
                return Ok(None);
            }
        };

        for &stage in &self.stages {
            let rows_before = table.row_count();
            table = match self
                .apply(stage, table, ctx, rng)
                .map_err(|e| e.in_file(ctx.dataset, ctx.file))
            {
                Ok(table) => table,
                Err(e) if e.is_structural() => {
                    tracing::error!(
                        dataset = ctx.dataset,
                        file = ctx.file,
                        stage = %stage,
                        error = %e,
                        "Structural failure, aborting run"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        dataset = ctx.dataset,
                        file = ctx.file,
                        stage = %stage,
                        error = %e,
                        "Stage failed, excluding file"
                    );
                    report.fail_file(ctx.dataset, ctx.file, stage.tag(), e.to_string());
                    return Ok(None);
                }
            };
            file_lineage.add_stage(StageRecord::new(stage, rows_before, table.row_count()));

            if self.config.cache_intermediate {
                let cache = output_root
                    .join(format!("{}_{}", stage.tag(), ctx.dataset))
                    .join(ctx.file);
                table.write_csv(&cache)?;
            }
        }

        let out = output_root
            .join(format!("{}_{}", self.final_dir, ctx.dataset))
            .join(ctx.file);
        table.write_csv(&out)?;
        file_lineage.seal(&out)?;

        report.record(
            ctx.dataset,
            ctx.file,
            TRANSFORMED_CHECK,
            CheckResult::passed(json!({
                "rows": table.row_count(),
                "columns": table.columns,
                "stages": self.stages.iter().map(|s| s.tag()).collect::<Vec<_>>(),
            })),
        );
        Ok(Some((table, file_lineage)))
    }

    fn apply<R: Rng + ?Sized>(
        &self,
        stage: Stage,
        table: Table,
        ctx: &StageContext<'_>,
        rng: &mut R,
    ) -> Result<Table, DataError> {
        match stage {
            Stage::Cleaned => Ok(remove_duplicates(table, ctx)),
            Stage::ZeroShot => Ok(zero_shot_transform(
                table,
                ctx,
                &self.config.zero_shot_format,
            )),
            Stage::Folded => match &self.config.splitter {
                // Only train files carry labels to fold on.
                Some(splitter) if ctx.role == FileRole::Train => {
                    let (labels, forced) = resolve_request(splitter, ctx.schema);
                    assign_folds(table, ctx, labels.as_ref(), splitter.n_splits, forced, rng)
                }
                _ => Ok(table),
            },
            Stage::Triplet => match &self.config.triplet {
                Some(triplet) if ctx.role == FileRole::Train => {
                    Ok(build_triplets(table, ctx, triplet, rng)?.table)
                }
                _ => Ok(table),
            },
            Stage::Pairwise => match &self.config.triplet {
                Some(triplet) => expand_pairs(table, ctx, triplet.n_negatives),
                None => Ok(table),
            },
        }
    }

    /// Train rows of the validation fold, or an empty table with the train header.
    fn valid_rows(&self, train: &Table) -> Table {
        let fold = self
            .config
            .valid_fold
            .filter(|_| self.stages.contains(&Stage::Folded))
            .zip(train.column_index(FOLD_COLUMN));
        match fold {
            Some((fold, idx)) => {
                let wanted = Value::Int(fold as i64);
                let rows: Vec<usize> = (0..train.row_count())
                    .filter(|&r| train.rows[r][idx] == wanted)
                    .collect();
                train.take_rows(&rows)
            }
            None => Table::empty(train.columns.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jigsaw_core::{SplitKind, SplitterConfig, TripletConfig};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const YAML: &str = r#"
jigsaw:
  columns: { body: str, rule: str, rule_violation: int }
  features: [body, rule]
  target: rule_violation
  train: [train.csv]
  test: [test.csv]
"#;

    fn write_inputs(root: &Path) {
        let ds = root.join("jigsaw");
        std::fs::create_dir_all(&ds).unwrap();
        let mut train = String::from("body,rule,rule_violation\n");
        for i in 0..40 {
            train.push_str(&format!("text {i},rule_{},{}\n", i % 2, i64::from(i % 4 == 0)));
        }
        std::fs::write(ds.join("train.csv"), train).unwrap();
        std::fs::write(ds.join("test.csv"), "body,rule\nq,rule_0\nw,rule_1\n").unwrap();
    }

    fn folded_config() -> PipelineConfig {
        PipelineConfig {
            splitter: Some(SplitterConfig {
                kind: SplitKind::Skfold,
                n_splits: 4,
                labels: None,
            }),
            valid_fold: Some(0),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_final_dir_follows_enabled_stages() {
        let registry = SchemaRegistry::default();
        let config = PipelineConfig {
            triplet: Some(TripletConfig {
                anchor_column: "rule".into(),
                sample_column: "body".into(),
                n_negatives: 2,
                n_samples: 1,
                reversed: false,
            }),
            pairwise: true,
            ..folded_config()
        };
        let pipeline = TransformationPipeline::new(&config, &registry);
        assert_eq!(pipeline.final_dir(), "cleaned_folded_triplet_pairwise");

        let plain = PipelineConfig::default();
        assert_eq!(TransformationPipeline::new(&plain, &registry).final_dir(), "cleaned");
    }

    #[test]
    fn test_run_writes_outputs_and_combined_files() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_inputs(input.path());
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = folded_config();

        let pipeline = TransformationPipeline::new(&config, &registry);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let artifact = pipeline.run(input.path(), output.path(), &mut rng).unwrap();

        assert!(!artifact.report.has_failures());
        assert!(output.path().join("cleaned_folded_jigsaw/train.csv").is_file());
        assert!(output.path().join("cleaned_folded_jigsaw/test.csv").is_file());

        let train = Table::read_csv(artifact.train_file.as_deref().unwrap()).unwrap();
        let valid = Table::read_csv(artifact.valid_file.as_deref().unwrap()).unwrap();
        let test = Table::read_csv(artifact.test_file.as_deref().unwrap()).unwrap();
        assert_eq!(train.row_count(), 40);
        assert_eq!(valid.row_count(), 10);
        assert!(
            valid
                .column_values(FOLD_COLUMN)
                .unwrap()
                .iter()
                .all(|v| **v == Value::Int(0))
        );
        assert!(!test.has_column(FOLD_COLUMN));

        assert_eq!(artifact.lineage.files.len(), 2);
        assert!(artifact.lineage.verify_integrity());
        assert!(artifact.manifest_path.is_file());
        assert!(StatusReport::load(&artifact.report_path).unwrap().is_some());
    }

    #[test]
    fn test_cache_intermediate_writes_every_stage() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_inputs(input.path());
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = PipelineConfig {
            cache_intermediate: true,
            ..folded_config()
        };

        TransformationPipeline::new(&config, &registry)
            .run(input.path(), output.path(), &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(output.path().join("cleaned_jigsaw/train.csv").is_file());
        assert!(output.path().join("folded_jigsaw/train.csv").is_file());
    }

    #[test]
    fn test_missing_file_and_unknown_dataset_are_recorded() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_inputs(input.path());
        std::fs::remove_file(input.path().join("jigsaw/test.csv")).unwrap();
        std::fs::create_dir_all(input.path().join("stray")).unwrap();
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = folded_config();

        let artifact = TransformationPipeline::new(&config, &registry)
            .run(input.path(), output.path(), &mut StdRng::seed_from_u64(1))
            .unwrap();

        let stages: Vec<(&str, Option<&str>, &str)> = artifact
            .report
            .failures
            .iter()
            .map(|f| (f.dataset.as_str(), f.file.as_deref(), f.stage.as_str()))
            .collect();
        assert_eq!(
            stages,
            vec![("jigsaw", Some("test.csv"), "load"), ("stray", None, "schema_lookup")]
        );
        assert!(artifact.train_file.is_some());
        assert!(artifact.test_file.is_none());
    }

    #[test]
    fn test_dataset_with_every_file_failing_is_reported() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let ds = input.path().join("jigsaw");
        std::fs::create_dir_all(&ds).unwrap();
        std::fs::write(ds.join("train.csv"), "body,rule,rule_violation\n").unwrap();
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = folded_config();

        let artifact = TransformationPipeline::new(&config, &registry)
            .run(input.path(), output.path(), &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(
            artifact
                .report
                .failures
                .iter()
                .any(|f| f.file.as_deref() == Some("train.csv") && f.stage == "folded")
        );
        assert!(
            artifact
                .report
                .failures
                .iter()
                .any(|f| f.file.is_none() && f.stage == "transform")
        );
        assert!(artifact.train_file.is_none());
    }

    fn triplet_config() -> TripletConfig {
        TripletConfig {
            anchor_column: "rule".into(),
            sample_column: "body".into(),
            n_negatives: 1,
            n_samples: 1,
            reversed: false,
        }
    }

    #[test]
    fn test_unknown_triplet_column_aborts_before_any_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_inputs(input.path());
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = PipelineConfig {
            triplet: Some(TripletConfig {
                anchor_column: "no_such_col".into(),
                ..triplet_config()
            }),
            ..folded_config()
        };

        let err = TransformationPipeline::new(&config, &registry)
            .run(input.path(), output.path(), &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("no_such_col"));
        assert!(!output.path().join(STATUS_FILE).exists());
        assert!(!output.path().join("cleaned_folded_triplet_jigsaw").exists());
    }

    #[test]
    fn test_zero_shot_with_triplets_keeps_test_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let ds = input.path().join("jigsaw");
        std::fs::create_dir_all(&ds).unwrap();

        let header = "body,rule,rule_violation,positive_example_1,positive_example_2,negative_example_1,negative_example_2\n";
        let mut train = String::from(header);
        for i in 0..12 {
            train.push_str(&format!(
                "text {i},rule_{r},{v},pos {i}a,pos {i}b,neg {i}a,neg {i}b\n",
                r = i % 2,
                v = i64::from(i % 3 == 0)
            ));
        }
        std::fs::write(ds.join("train.csv"), train).unwrap();
        std::fs::write(
            ds.join("test.csv"),
            "body,rule,positive_example_1,positive_example_2,negative_example_1,negative_example_2\n\
             q,rule_0,tp0,tp1,tn0,tn1\n\
             w,rule_1,tp2,tp3,tn2,tn3\n",
        )
        .unwrap();

        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let config = PipelineConfig {
            zero_shot: true,
            triplet: Some(triplet_config()),
            ..PipelineConfig::default()
        };
        let artifact = TransformationPipeline::new(&config, &registry)
            .run(input.path(), output.path(), &mut StdRng::seed_from_u64(3))
            .unwrap();

        assert!(!artifact.report.has_failures(), "{:?}", artifact.report.failures);
        let test = Table::read_csv(artifact.test_file.as_deref().unwrap()).unwrap();
        assert!(test.has_column("rule_violation"));
        assert!(!test.has_column("anchor"));
        assert_eq!(test.row_count(), 2 + 2 * 4);

        let train = Table::read_csv(artifact.train_file.as_deref().unwrap()).unwrap();
        assert!(train.has_column("anchor"));
    }
}
