//! # jigsaw-data: validation and transformation of competition datasets
//!
//! Raw CSV files are checked against per-dataset schema declarations and split
//! into valid and invalid trees ([`data::validate`]). The valid tree then runs
//! through the enabled transformation stages ([`transform`]): duplicate
//! removal, zero-shot reformatting, fold assignment, triplet sampling and
//! pairwise expansion. Every run writes a JSON status report, and a
//! transformation run also writes a lineage manifest with output hashes.

pub mod data;
pub mod error;
pub mod report;
pub mod transform;

pub use data::{
    DataSchema, FileRole, SchemaRegistry, Table, ValidationArtifact, ValidationStage, Value,
};
pub use error::DataError;
pub use report::{CheckResult, CheckStatus, Failure, StatusReport};
pub use transform::{Stage, StageContext, TransformationArtifact, TransformationPipeline};
