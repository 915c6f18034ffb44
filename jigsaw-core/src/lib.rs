//! # jigsaw-core
//!
//! Shared foundation of the Jigsaw data pipeline: layered configuration,
//! configuration errors, atomic artifact persistence and run management.

pub mod config;
pub mod error;
pub mod persistence;
pub mod run;

pub use config::{
    ConfigOverrides, LabelSpec, PipelineConfig, SplitKind, SplitterConfig, TripletConfig,
    ZeroShotFormat, load_config,
};
pub use error::{ConfigError, RunError};
pub use run::{RunContext, RunSnapshot};
