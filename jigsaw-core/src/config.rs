//! Configuration system for the Jigsaw pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `jigsaw.toml` in the workspace directory, or from an explicit
//! `--config` path (`.json` files are read with the JSON provider).
//!
//! Every section rejects unknown keys, and [`PipelineConfig::validate`] rejects structurally
//! invalid values, so a bad splitter or triplet request fails before any dataset is read.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the workspace when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "jigsaw.toml";

/// Prefix for environment overrides (`JIGSAW_SEED`, `JIGSAW_SPLITTER__N_SPLITS`, ...).
pub const ENV_PREFIX: &str = "JIGSAW_";

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Process-wide seed. Every random decision of a run derives from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Root under which each run creates its timestamped directory.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Root holding one sub-directory of raw CSV files per dataset.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// YAML schema declarations: a single file, or a directory of `<dataset>.yaml`.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// Reformat labelled rule examples into extra training rows.
    #[serde(default)]
    pub zero_shot: bool,
    /// Flatten triplet records into one row per (anchor, positive, negative).
    #[serde(default)]
    pub pairwise: bool,
    /// Persist the output of every stage, not only the final one.
    #[serde(default)]
    pub cache_intermediate: bool,
    /// Fold routed to the combined `valid.csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_fold: Option<usize>,
    /// Fold assignment settings. Folding is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitter: Option<SplitterConfig>,
    /// Triplet sampling settings. Triplet construction is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triplet: Option<TripletConfig>,
    /// Column naming used by the zero-shot reformatting.
    #[serde(default)]
    pub zero_shot_format: ZeroShotFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            artifacts_dir: default_artifacts_dir(),
            input_dir: default_input_dir(),
            schema_path: default_schema_path(),
            splitter: None,
            triplet: None,
            zero_shot: false,
            zero_shot_format: ZeroShotFormat::default(),
            pairwise: false,
            cache_intermediate: false,
            valid_fold: None,
        }
    }
}

fn default_seed() -> u64 {
    1234
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.yaml")
}

/// Requested fold-splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    /// Plain K-fold over shuffled rows.
    Kfold,
    /// Single-label stratified K-fold.
    Skfold,
    /// Multilabel stratified K-fold.
    Mlskfold,
}

impl std::fmt::Display for SplitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitKind::Kfold => write!(f, "kfold"),
            SplitKind::Skfold => write!(f, "skfold"),
            SplitKind::Mlskfold => write!(f, "mlskfold"),
        }
    }
}

/// A single label column or an ordered list of label columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSpec {
    Single(String),
    Multi(Vec<String>),
}

impl LabelSpec {
    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            LabelSpec::Single(col) => vec![col.as_str()],
            LabelSpec::Multi(cols) => cols.iter().map(String::as_str).collect(),
        }
    }

    /// A one-element list collapses to the single column it names.
    pub fn collapse(&self) -> LabelSpec {
        match self {
            LabelSpec::Multi(cols) if cols.len() == 1 => LabelSpec::Single(cols[0].clone()),
            other => other.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LabelSpec::Single(col) => col.is_empty(),
            LabelSpec::Multi(cols) => cols.is_empty(),
        }
    }
}

/// Fold assignment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitterConfig {
    #[serde(rename = "type")]
    pub kind: SplitKind,
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    /// Label column(s) overriding the schema target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelSpec>,
}

fn default_n_splits() -> usize {
    5
}

/// Triplet sampling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TripletConfig {
    /// Column whose value groups positives with their candidate negatives.
    pub anchor_column: String,
    /// Column whose values fill the positive and negative slots.
    pub sample_column: String,
    /// Negative slots per output record.
    pub n_negatives: usize,
    /// How many times every base row is repeated.
    pub n_samples: usize,
    /// Swap the roles of the two classes.
    #[serde(default)]
    pub reversed: bool,
}

/// Column naming for the zero-shot reformatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZeroShotFormat {
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_text_column")]
    pub text_column: String,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_positive_prefix")]
    pub positive_prefix: String,
    #[serde(default = "default_negative_prefix")]
    pub negative_prefix: String,
    #[serde(default = "default_examples_per_polarity")]
    pub examples_per_polarity: usize,
}

impl Default for ZeroShotFormat {
    fn default() -> Self {
        Self {
            key_column: default_key_column(),
            text_column: default_text_column(),
            target_column: default_target_column(),
            positive_prefix: default_positive_prefix(),
            negative_prefix: default_negative_prefix(),
            examples_per_polarity: default_examples_per_polarity(),
        }
    }
}

fn default_key_column() -> String {
    "rule".to_string()
}

fn default_text_column() -> String {
    "body".to_string()
}

fn default_target_column() -> String {
    "rule_violation".to_string()
}

fn default_positive_prefix() -> String {
    "positive_example_".to_string()
}

fn default_negative_prefix() -> String {
    "negative_example_".to_string()
}

fn default_examples_per_polarity() -> usize {
    2
}

/// Values supplied on the command line; only the `Some` fields are merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Reject configurations that would fail deep inside a transformation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(splitter) = &self.splitter {
            if splitter.n_splits < 2 {
                return Err(ConfigError::invalid(format!(
                    "splitter.n_splits must be at least 2, got {}",
                    splitter.n_splits
                )));
            }
            if let Some(labels) = &splitter.labels {
                if labels.columns().iter().any(|c| c.trim().is_empty()) {
                    return Err(ConfigError::invalid(
                        "splitter.labels contains an empty column name",
                    ));
                }
            }
        }

        match (self.valid_fold, &self.splitter) {
            (Some(_), None) => {
                return Err(ConfigError::invalid(
                    "valid_fold requires a [splitter] section",
                ));
            }
            (Some(fold), Some(splitter)) if fold >= splitter.n_splits => {
                return Err(ConfigError::invalid(format!(
                    "valid_fold {fold} is out of range for {} splits",
                    splitter.n_splits
                )));
            }
            _ => {}
        }

        if let Some(triplet) = &self.triplet {
            if triplet.anchor_column.trim().is_empty() {
                return Err(ConfigError::missing("triplet.anchor_column"));
            }
            if triplet.sample_column.trim().is_empty() {
                return Err(ConfigError::missing("triplet.sample_column"));
            }
            if triplet.anchor_column == triplet.sample_column {
                return Err(ConfigError::invalid(
                    "triplet.anchor_column and triplet.sample_column must differ",
                ));
            }
            if triplet.n_negatives == 0 {
                return Err(ConfigError::invalid("triplet.n_negatives must be positive"));
            }
            if triplet.n_samples == 0 {
                return Err(ConfigError::invalid("triplet.n_samples must be positive"));
            }
        }

        if self.pairwise && self.triplet.is_none() {
            return Err(ConfigError::invalid(
                "pairwise requires a [triplet] section",
            ));
        }

        if self.zero_shot {
            let fmt = &self.zero_shot_format;
            if fmt.key_column.is_empty() || fmt.text_column.is_empty() {
                return Err(ConfigError::invalid(
                    "zero_shot_format key_column and text_column must be set",
                ));
            }
            if fmt.examples_per_polarity == 0 {
                return Err(ConfigError::invalid(
                    "zero_shot_format.examples_per_polarity must be positive",
                ));
            }
        }

        Ok(())
    }

    /// Anchor relative paths at the workspace directory.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        for path in [
            &mut self.artifacts_dir,
            &mut self.input_dir,
            &mut self.schema_path,
        ] {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `JIGSAW_`, `__` separates nested keys)
/// 3. The explicit config file, or `jigsaw.toml` in the workspace
/// 4. Built-in defaults
///
/// The merged configuration is validated before it is returned.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<PipelineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = if path.extension().is_some_and(|ext| ext == "json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = ws.join(CONFIG_FILE_NAME);
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let mut config: PipelineConfig = figment.extract().map_err(Box::new)?;
    if let Some(ws) = workspace {
        config.resolve_paths(ws);
    }
    config.validate()?;

    tracing::debug!(
        seed = config.seed,
        splitter = config.splitter.is_some(),
        triplet = config.triplet.is_some(),
        "Loaded pipeline configuration"
    );
    Ok(config)
}

/// Check whether a workspace config file exists.
pub fn config_exists(workspace: &Path) -> bool {
    workspace.join(CONFIG_FILE_NAME).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplet() -> TripletConfig {
        TripletConfig {
            anchor_column: "rule".into(),
            sample_column: "body".into(),
            n_negatives: 3,
            n_samples: 2,
            reversed: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 1234);
        assert!(config.splitter.is_none());
        assert!(config.triplet.is_none());
        assert!(!config.zero_shot);
        assert_eq!(config.zero_shot_format.key_column, "rule");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = PipelineConfig::default();
        config.splitter = Some(SplitterConfig {
            kind: SplitKind::Mlskfold,
            n_splits: 4,
            labels: Some(LabelSpec::Multi(vec!["a".into(), "b".into()])),
        });
        config.triplet = Some(triplet());
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: PipelineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_labels_accept_string_or_list() {
        let single: SplitterConfig = toml::from_str("type = \"skfold\"\nlabels = \"target\"").unwrap();
        assert_eq!(single.labels, Some(LabelSpec::Single("target".into())));
        assert_eq!(single.n_splits, 5);

        let multi: SplitterConfig =
            toml::from_str("type = \"mlskfold\"\nn_splits = 3\nlabels = [\"x\", \"y\"]").unwrap();
        assert_eq!(
            multi.labels,
            Some(LabelSpec::Multi(vec!["x".into(), "y".into()]))
        );
    }

    #[test]
    fn test_label_spec_collapse() {
        let one = LabelSpec::Multi(vec!["only".into()]);
        assert_eq!(one.collapse(), LabelSpec::Single("only".into()));
        let two = LabelSpec::Multi(vec!["a".into(), "b".into()]);
        assert_eq!(two.collapse(), two);
        assert!(LabelSpec::Multi(vec![]).is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<SplitterConfig, _> = toml::from_str("type = \"kfold\"\nshuffle = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_single_split() {
        let mut config = PipelineConfig::default();
        config.splitter = Some(SplitterConfig {
            kind: SplitKind::Kfold,
            n_splits: 1,
            labels: None,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_negatives() {
        let mut config = PipelineConfig::default();
        let mut t = triplet();
        t.n_negatives = 0;
        config.triplet = Some(t);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_pairwise_without_triplet() {
        let mut config = PipelineConfig::default();
        config.pairwise = true;
        assert!(config.validate().is_err());
        config.triplet = Some(triplet());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_valid_fold_range() {
        let mut config = PipelineConfig::default();
        config.valid_fold = Some(0);
        assert!(config.validate().is_err());

        config.splitter = Some(SplitterConfig {
            kind: SplitKind::Skfold,
            n_splits: 5,
            labels: None,
        });
        assert!(config.validate().is_ok());
        config.valid_fold = Some(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.seed, 1234);
        assert_eq!(config.input_dir, dir.path().join("data"));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = ConfigOverrides {
            seed: Some(7),
            ..Default::default()
        };
        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.artifacts_dir, PathBuf::from("artifacts"));
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
seed = 2025
zero_shot = true

[splitter]
type = "skfold"
n_splits = 4

[triplet]
anchor_column = "rule"
sample_column = "body"
n_negatives = 2
n_samples = 3
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.seed, 2025);
        assert!(config.zero_shot);
        let splitter = config.splitter.unwrap();
        assert_eq!(splitter.kind, SplitKind::Skfold);
        assert_eq!(splitter.n_splits, 4);
        let triplet = config.triplet.unwrap();
        assert_eq!(triplet.n_samples, 3);
        assert!(!triplet.reversed);
    }

    #[test]
    fn test_load_config_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[splitter]\ntype = \"kfold\"\nn_splits = 1\n",
        )
        .unwrap();
        assert!(load_config(Some(dir.path()), None, None).is_err());
    }

    #[test]
    fn test_load_config_explicit_missing() {
        let result = load_config(None, Some(Path::new("/nonexistent/jigsaw.toml")), None);
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_config_explicit_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"seed": 99, "splitter": {"type": "mlskfold", "labels": ["a", "b"]}}"#,
        )
        .unwrap();
        let config = load_config(None, Some(&path), None).unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.splitter.unwrap().kind, SplitKind::Mlskfold);
    }
}
