//! Run management: timestamped artifact roots and the process-wide seed.
//!
//! A run owns one directory under `artifacts_dir` and one seeded RNG. The RNG
//! is created once and lent to every stage, so the seed alone determines all
//! shuffling, fold tie-breaks and bucket re-deals of the run.

use crate::error::RunError;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Format of the per-run directory name.
pub const RUN_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Snapshot of the run environment, persisted next to the artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub platform: String,
    pub version: String,
}

/// Artifact root and seed of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    seed: u64,
    root: PathBuf,
    started_at: DateTime<Utc>,
}

impl RunContext {
    /// Create a fresh `artifacts_dir/<YYYYMMDD_HHMMSS>` root.
    ///
    /// A second run started within the same second gets a numeric suffix
    /// instead of sharing the directory.
    pub fn create(artifacts_dir: &Path, seed: u64) -> Result<Self, RunError> {
        let started_at = Utc::now();
        let stamp = started_at.format(RUN_DIR_FORMAT).to_string();

        let mut root = artifacts_dir.join(&stamp);
        let mut attempt = 1;
        while root.exists() {
            root = artifacts_dir.join(format!("{stamp}_{attempt}"));
            attempt += 1;
        }
        std::fs::create_dir_all(&root).map_err(|source| RunError::CreateDir {
            path: root.clone(),
            source,
        })?;

        tracing::info!(root = %root.display(), seed, "Created run directory");
        Ok(Self {
            seed,
            root,
            started_at,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The single RNG of the run. Call once and pass it down by `&mut`.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            seed: self.seed,
            started_at: self.started_at,
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_create_makes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunContext::create(dir.path(), 42).unwrap();
        assert!(run.root().is_dir());
        assert!(run.root().starts_with(dir.path()));
        assert_eq!(run.seed(), 42);
    }

    #[test]
    fn test_two_runs_get_distinct_roots() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunContext::create(dir.path(), 1).unwrap();
        let second = RunContext::create(dir.path(), 1).unwrap();
        assert_ne!(first.root(), second.root());
    }

    #[test]
    fn test_rng_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunContext::create(dir.path(), 2025).unwrap();
        let a: Vec<u32> = (0..8).map(|_| run.rng().gen_range(0..1000)).collect();
        let mut rng1 = run.rng();
        let mut rng2 = run.rng();
        let b: Vec<u32> = (0..8).map(|_| rng1.gen_range(0..1000)).collect();
        let c: Vec<u32> = (0..8).map(|_| rng2.gen_range(0..1000)).collect();
        assert_eq!(b, c);
        assert!(a.iter().all(|v| *v == a[0]));
    }

    #[test]
    fn test_snapshot_carries_seed() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunContext::create(dir.path(), 9).unwrap();
        let snap = run.snapshot();
        assert_eq!(snap.seed, 9);
        assert!(!snap.platform.is_empty());
    }
}
