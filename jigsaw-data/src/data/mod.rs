//! Data layer: tables, sources, schema declarations, validation and lineage.

pub mod lineage;
pub mod schema;
pub mod source;
pub mod table;
pub mod validate;

pub use lineage::{FileLineage, LineageManifest, StageRecord};
pub use schema::{DataSchema, DeclaredType, FileRole, SchemaRegistry, TargetSpec};
pub use source::{CsvSource, DataSource, DataSourceInfo};
pub use table::{ColumnType, Table, Value};
pub use validate::{ValidationArtifact, ValidationOutcome, ValidationStage, validate_table};
