//! Schema declarations per dataset and the registry that loads them from YAML.
//!
//! A declaration file maps dataset names to their columns, feature and target
//! columns, and the train/test/submission files they ship:
//!
//! ```yaml
//! jigsaw:
//!   columns: { body: str, rule: str, rule_violation: int }
//!   features: [body, rule]
//!   target: rule_violation
//!   train: [train.csv]
//!   test: [test.csv]
//!   submission: [sample_submission.csv]
//! ```
//!
//! The registry can also be a directory of `<dataset>.yaml` files holding one
//! declaration each.

use crate::data::table::ColumnType;
use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Target column(s) of a dataset: one name, or an ordered list for multilabel data.
pub type TargetSpec = jigsaw_core::LabelSpec;

/// Declared type family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeclaredType {
    String,
    Integer,
    Float,
    Category,
}

impl DeclaredType {
    /// Whether a column inferred as `found` satisfies this declaration.
    ///
    /// All-null columns satisfy any declaration; nulls are reported by the
    /// missing-rows check instead.
    pub fn accepts(self, found: ColumnType) -> bool {
        match (self, found) {
            (_, ColumnType::Null) | (DeclaredType::Category, _) => true,
            (DeclaredType::String, ColumnType::String) => true,
            (DeclaredType::Integer, ColumnType::Integer) => true,
            (DeclaredType::Float, ColumnType::Integer | ColumnType::Float) => true,
            _ => false,
        }
    }
}

impl FromStr for DeclaredType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "str" | "string" | "object" => Ok(DeclaredType::String),
            "int" | "int32" | "int64" | "integer" | "natural" => Ok(DeclaredType::Integer),
            "float" | "float32" | "float64" | "double" => Ok(DeclaredType::Float),
            "category" | "categorical" => Ok(DeclaredType::Category),
            other => Err(format!("unknown column type '{other}'")),
        }
    }
}

impl TryFrom<String> for DeclaredType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeclaredType> for String {
    fn from(value: DeclaredType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclaredType::String => "str",
            DeclaredType::Integer => "int",
            DeclaredType::Float => "float",
            DeclaredType::Category => "category",
        };
        f.write_str(name)
    }
}

/// Which group of a dataset a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Train,
    Test,
    Submission,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRole::Train => write!(f, "train"),
            FileRole::Test => write!(f, "test"),
            FileRole::Submission => write!(f, "submission"),
        }
    }
}

/// Declaration of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSchema {
    /// Filled from the registry key when omitted.
    #[serde(default)]
    pub name: String,
    pub columns: BTreeMap<String, DeclaredType>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSpec>,
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub train: Vec<String>,
    #[serde(default)]
    pub test: Vec<String>,
    #[serde(default)]
    pub submission: Vec<String>,
}

impl DataSchema {
    pub fn target_columns(&self) -> Vec<&str> {
        self.target.as_ref().map(|t| t.columns()).unwrap_or_default()
    }

    /// Files of one role, in declaration order.
    pub fn files(&self, role: FileRole) -> &[String] {
        match role {
            FileRole::Train => &self.train,
            FileRole::Test => &self.test,
            FileRole::Submission => &self.submission,
        }
    }

    /// Columns a file of `role` must carry. Test files have no target.
    pub fn required_columns(&self, role: FileRole) -> Vec<&str> {
        match role {
            FileRole::Submission => Vec::new(),
            FileRole::Train => self.columns.keys().map(String::as_str).collect(),
            FileRole::Test => {
                let targets = self.target_columns();
                self.columns
                    .keys()
                    .map(String::as_str)
                    .filter(|c| !targets.contains(c))
                    .collect()
            }
        }
    }

    /// Features followed by target column(s).
    pub fn feature_and_target_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.features.iter().map(String::as_str).collect();
        for t in self.target_columns() {
            if !cols.contains(&t) {
                cols.push(t);
            }
        }
        cols
    }

    fn check(&self) -> Result<(), DataError> {
        for col in self.feature_and_target_columns() {
            if !self.columns.contains_key(col) {
                return Err(DataError::configuration(format!(
                    "dataset '{}' lists '{col}' as feature or target but does not declare it",
                    self.name
                )));
            }
        }
        if let Some(col) = self.categorical.iter().find(|c| !self.columns.contains_key(*c)) {
            return Err(DataError::configuration(format!(
                "dataset '{}' lists undeclared categorical column '{col}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// All dataset declarations of a run, keyed by dataset name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, DataSchema>,
}

impl SchemaRegistry {
    /// Load from a YAML file of `name -> declaration`, or a directory of `<name>.yaml` files.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        if !path.exists() {
            return Err(DataError::configuration(format!(
                "schema path '{}' does not exist",
                path.display()
            )));
        }

        let registry = if path.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(path)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .is_some_and(|ext| ext == "yaml" || ext == "yml")
                })
                .collect();
            entries.sort();

            let mut registry = SchemaRegistry::default();
            for file in entries {
                let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let schema: DataSchema = serde_yaml::from_str(&std::fs::read_to_string(&file)?)?;
                registry.insert(name, schema)?;
            }
            registry
        } else {
            Self::from_yaml_str(&std::fs::read_to_string(path)?)?
        };

        tracing::info!(
            path = %path.display(),
            datasets = registry.len(),
            "Loaded schema registry"
        );
        Ok(registry)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DataError> {
        let raw: BTreeMap<String, DataSchema> = serde_yaml::from_str(yaml)?;
        let mut registry = SchemaRegistry::default();
        for (name, schema) in raw {
            registry.insert(&name, schema)?;
        }
        Ok(registry)
    }

    /// Register a declaration under `name`, checking it refers only to declared columns.
    pub fn insert(&mut self, name: &str, mut schema: DataSchema) -> Result<(), DataError> {
        schema.name = name.to_string();
        schema.check()?;
        self.schemas.insert(name.to_string(), schema);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DataSchema, DataError> {
        self.schemas
            .get(name)
            .ok_or_else(|| DataError::schema_lookup(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataSchema)> {
        self.schemas.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
