//! Lineage of every transformed file: source, applied stages and a hash chain.

use crate::data::source::DataSourceInfo;
use crate::error::DataError;
use crate::transform::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// One stage applied to a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub rows_before: usize,
    pub rows_after: usize,
    pub applied_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(stage: Stage, rows_before: usize, rows_after: usize) -> Self {
        Self {
            stage,
            rows_before,
            rows_after,
            applied_at: Utc::now(),
        }
    }

    fn chain_input(&self) -> String {
        format!("{}:{}:{}", self.stage.tag(), self.rows_before, self.rows_after)
    }
}

/// Lineage record for one output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLineage {
    pub dataset: String,
    pub file: String,
    pub source: DataSourceInfo,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_sha256: Option<String>,
    pub hash_chain: Vec<String>,
}

impl FileLineage {
    pub fn new(dataset: &str, file: &str, source: DataSourceInfo) -> Self {
        let initial_hash = compute_hash(&format!("{dataset}:{file}:{}", source.location));
        Self {
            dataset: dataset.to_string(),
            file: file.to_string(),
            source,
            stages: Vec::new(),
            output_sha256: None,
            hash_chain: vec![initial_hash],
        }
    }

    /// Add a stage record and extend the hash chain.
    pub fn add_stage(&mut self, record: StageRecord) {
        let prev_hash = self.hash_chain.last().cloned().unwrap_or_default();
        let new_hash = compute_hash(&format!("{prev_hash}:{}", record.chain_input()));
        self.hash_chain.push(new_hash);
        self.stages.push(record);
    }

    /// Hash the written output file.
    pub fn seal(&mut self, output: &Path) -> Result<(), DataError> {
        self.output_sha256 = Some(hash_file(output)?);
        Ok(())
    }

    /// Verify the integrity of the hash chain.
    pub fn verify_integrity(&self) -> bool {
        if self.hash_chain.len() != self.stages.len() + 1 {
            return false;
        }

        let expected_initial = compute_hash(&format!(
            "{}:{}:{}",
            self.dataset, self.file, self.source.location
        ));
        if self.hash_chain[0] != expected_initial {
            return false;
        }

        self.stages.iter().enumerate().all(|(i, record)| {
            let expected = compute_hash(&format!("{}:{}", self.hash_chain[i], record.chain_input()));
            self.hash_chain[i + 1] == expected
        })
    }
}

/// All lineage records of one transformation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageManifest {
    pub seed: u64,
    pub final_dir: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileLineage>,
}

impl LineageManifest {
    pub fn new(seed: u64, final_dir: &str) -> Self {
        Self {
            seed,
            final_dir: final_dir.to_string(),
            created_at: Utc::now(),
            files: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        jigsaw_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn verify_integrity(&self) -> bool {
        self.files.iter().all(FileLineage::verify_integrity)
    }
}

fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's bytes, hex encoded.
pub fn hash_file(path: &Path) -> Result<String, DataError> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::{CsvSource, DataSource};

    fn lineage() -> FileLineage {
        FileLineage::new("jigsaw", "train.csv", CsvSource::new("in/jigsaw/train.csv").source_info())
    }

    #[test]
    fn test_lineage_creation() {
        let lineage = lineage();
        assert_eq!(lineage.hash_chain.len(), 1);
        assert!(lineage.verify_integrity());
    }

    #[test]
    fn test_lineage_with_stages() {
        let mut lineage = lineage();
        lineage.add_stage(StageRecord::new(Stage::Cleaned, 100, 97));
        lineage.add_stage(StageRecord::new(Stage::Folded, 97, 97));
        assert_eq!(lineage.hash_chain.len(), 3);
        assert!(lineage.verify_integrity());
    }

    #[test]
    fn test_tampering_breaks_chain() {
        let mut lineage = lineage();
        lineage.add_stage(StageRecord::new(Stage::Triplet, 20, 40));
        lineage.stages[0].rows_after = 41;
        assert!(!lineage.verify_integrity());
    }

    #[test]
    fn test_seal_hashes_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "abc").unwrap();

        let mut lineage = lineage();
        lineage.seal(&path).unwrap();
        assert_eq!(
            lineage.output_sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
