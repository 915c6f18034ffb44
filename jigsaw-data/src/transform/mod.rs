//! Transformation stages applied to validated tables, and the orchestrator composing them.
//!
//! Every stage takes the previous stage's table and a [`StageContext`] naming
//! the dataset and file it works on, and returns a new table. Stages run in
//! the fixed order of [`Stage::ALL`]; only the enabled subset is composed.

pub mod cleaning;
pub mod folding;
pub mod orchestrator;
pub mod pairwise;
pub mod triplet;
pub mod zeroshot;

use crate::data::schema::{DataSchema, FileRole};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use folding::{FoldPlan, assign_folds};
pub use orchestrator::{TransformationArtifact, TransformationPipeline};
pub use triplet::{TripletOutput, build_triplets};

/// Name of the column holding the fold index.
pub const FOLD_COLUMN: &str = "fold";

/// A transformation stage, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cleaned,
    ZeroShot,
    Folded,
    Triplet,
    Pairwise,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Cleaned,
        Stage::ZeroShot,
        Stage::Folded,
        Stage::Triplet,
        Stage::Pairwise,
    ];

    /// Directory tag of the stage.
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Cleaned => "cleaned",
            Stage::ZeroShot => "zero_shot",
            Stage::Folded => "folded",
            Stage::Triplet => "triplet",
            Stage::Pairwise => "pairwise",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identity of the file a stage is working on.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub dataset: &'a str,
    pub file: &'a str,
    pub role: FileRole,
    pub schema: &'a DataSchema,
}

impl StageContext<'_> {
    pub fn is_submission(&self) -> bool {
        self.role == FileRole::Submission
    }
}
